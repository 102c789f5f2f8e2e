//! Durable job queue.
//!
//! Callers enqueue work and return immediately; a [`WorkerPool`] drains the
//! queue. Every job is written to the [`JobStore`] before its id is
//! dispatched, so a restart loses nothing: [`JobQueue::recover`] re-dispatches
//! whatever was still pending or running.
//!
//! ```text
//! enqueue ──> JobStore (persist) ──> mpsc (job id) ──> worker ──> JobHandler
//!                  ▲                       ▲                        │
//!                  └──── status/result ────┴──── delayed retry <────┘
//! ```

pub mod handler;
pub mod job;
pub mod store;
pub mod worker;

pub use handler::{JobHandler, PaymentJobHandler};
pub use job::{BackoffPolicy, CreatePaymentJob, Job, JobHandle, JobOperation, JobStatus};
pub use store::{FileJobStore, JobStore, MemoryJobStore};
pub use worker::WorkerPool;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{QueueConfig, RetryConfig};
use crate::error::{PaygateError, Result};
use crate::utils::clock::Clock;

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    tx: mpsc::UnboundedSender<String>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            config,
            clock,
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn retry_config(&self, operation: &JobOperation) -> &RetryConfig {
        match operation {
            JobOperation::CreatePayment(_) => &self.config.create_payment,
            JobOperation::ProcessWebhook { .. } => &self.config.process_webhook,
        }
    }

    /// Persist a new job and hand it to the workers. Never waits on a worker.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use paygate::config::QueueConfig;
    /// use paygate::queue::{JobOperation, JobQueue, JobStatus, MemoryJobStore};
    /// use paygate::utils::SystemClock;
    ///
    /// # tokio_test::block_on(async {
    /// let queue = JobQueue::new(
    ///     Arc::new(MemoryJobStore::new()),
    ///     QueueConfig::default(),
    ///     Arc::new(SystemClock),
    /// );
    /// let op = JobOperation::ProcessWebhook { raw_payload: serde_json::json!({}) };
    /// let handle = queue.enqueue(op, "company_a").await.unwrap();
    /// assert_eq!(handle.operation, "processWebhook");
    /// assert_eq!(queue.list(Some(JobStatus::Pending)).await.unwrap().len(), 1);
    /// # });
    /// ```
    pub async fn enqueue(
        &self,
        operation: JobOperation,
        tenant_id: impl Into<String>,
    ) -> Result<JobHandle> {
        let retry = *self.retry_config(&operation);
        let job = Job::new(operation, tenant_id, &retry, self.clock.now());
        self.submit(job).await
    }

    async fn submit(&self, job: Job) -> Result<JobHandle> {
        self.store.upsert(&job).await?;
        self.dispatch(&job.id)?;
        info!(
            job_id = %job.id,
            operation = job.operation.name(),
            tenant = %job.tenant_id,
            "Job enqueued"
        );
        Ok(job.handle())
    }

    pub(crate) fn dispatch(&self, id: &str) -> Result<()> {
        self.tx
            .send(id.to_string())
            .map_err(|_| PaygateError::Queue("job channel closed".to_string()))
    }

    /// Dispatch `id` once `delay` has elapsed.
    pub(crate) fn schedule(&self, id: &str, delay: Duration) {
        let tx = self.tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(id).is_err() {
                debug!("Queue dropped before a delayed retry fired");
            }
        });
    }

    /// Next dispatched job id. `None` once every sender is gone.
    pub(crate) async fn next_id(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    /// Re-dispatch every non-terminal job found in the store. Jobs left
    /// `running` by a crash go back to `pending`. Returns how many were
    /// re-dispatched.
    pub async fn recover(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut recovered = 0;
        for mut job in self.store.load_all().await? {
            if job.status.is_terminal() {
                continue;
            }
            if job.status == JobStatus::Running {
                job.status = JobStatus::Pending;
                job.updated_at = now;
                self.store.upsert(&job).await?;
            }
            match job.next_run_at.filter(|at| *at > now) {
                Some(at) => {
                    let delay = (at - now).to_std().unwrap_or_default();
                    self.schedule(&job.id, delay);
                }
                None => self.dispatch(&job.id)?,
            }
            recovered += 1;
        }
        if recovered > 0 {
            info!(count = recovered, "Recovered unfinished jobs");
        }
        Ok(recovered)
    }

    /// Reset a failed job and run it again with a fresh attempt budget.
    pub async fn retry(&self, id: &str) -> Result<JobHandle> {
        let mut job = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| PaygateError::NotFound(format!("job {}", id)))?;
        if job.status != JobStatus::Failed {
            return Err(PaygateError::Queue(format!(
                "job {} is {}, only failed jobs can be retried",
                id, job.status
            )));
        }
        job.status = JobStatus::Pending;
        job.attempts = 0;
        job.last_error = None;
        job.next_run_at = None;
        job.updated_at = self.clock.now();
        warn!(job_id = %job.id, operation = job.operation.name(), "Manually retrying failed job");
        self.submit(job).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        self.store.list(status).await
    }

    /// Remove finished jobs: both terminal states when `status` is `None`.
    pub async fn purge(&self, status: Option<JobStatus>) -> Result<usize> {
        let statuses = match status {
            None => vec![JobStatus::Completed, JobStatus::Failed],
            Some(s) if s.is_terminal() => vec![s],
            Some(s) => {
                return Err(PaygateError::Queue(format!(
                    "cannot purge {} jobs, only completed or failed",
                    s
                )))
            }
        };
        let mut removed = 0;
        for status in statuses {
            removed += self.store.prune(status, 0).await?;
        }
        Ok(removed)
    }

    /// Apply the retention limits for finished jobs.
    pub(crate) async fn enforce_retention(&self) -> Result<()> {
        let completed = self
            .store
            .prune(JobStatus::Completed, self.config.retain_completed)
            .await?;
        let failed = self
            .store
            .prune(JobStatus::Failed, self.config.retain_failed)
            .await?;
        if completed + failed > 0 {
            debug!(completed, failed, "Pruned finished jobs");
        }
        Ok(())
    }
}
