//! Bounded worker pool draining a [`JobQueue`].

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handler::JobHandler;
use super::job::JobStatus;
use super::JobQueue;
use crate::error::{PaygateError, Result};
use crate::security::pci;

pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers (at least one) sharing the queue.
    pub fn start(queue: Arc<JobQueue>, handler: Arc<dyn JobHandler>, concurrency: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let size = concurrency.max(1);
        let handles = (0..size)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    queue.clone(),
                    handler.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        info!(workers = size, "Worker pool started");
        Self {
            shutdown_tx,
            handles,
        }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop taking new jobs and wait for in-flight attempts to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");
    loop {
        let id = tokio::select! {
            _ = shutdown_rx.changed() => break,
            next = queue.next_id() => match next {
                Some(id) => id,
                None => break,
            },
        };
        if let Err(e) = execute(&queue, handler.as_ref(), &id).await {
            error!(worker_id, job_id = %id, error = %e, "Job bookkeeping failed");
        }
        if *shutdown_rx.borrow() {
            break;
        }
    }
    debug!(worker_id, "Worker stopped");
}

/// Run one attempt of job `id` and record its outcome.
pub(crate) async fn execute(queue: &JobQueue, handler: &dyn JobHandler, id: &str) -> Result<()> {
    let Some(mut job) = queue.store().get(id).await? else {
        debug!(job_id = %id, "Dispatched job no longer exists");
        return Ok(());
    };
    if job.status.is_terminal() {
        debug!(job_id = %id, status = %job.status, "Skipping finished job");
        return Ok(());
    }

    job.status = JobStatus::Running;
    job.attempts += 1;
    job.next_run_at = None;
    job.updated_at = queue.clock().now();
    queue.store().upsert(&job).await?;

    let timeout = Duration::from_secs(queue.config().job_timeout_secs.max(1));
    let outcome = match tokio::time::timeout(timeout, handler.handle(&job)).await {
        Ok(result) => result,
        Err(_) => Err(PaygateError::Timeout(format!(
            "job attempt exceeded {}s",
            timeout.as_secs()
        ))),
    };

    let now = queue.clock().now();
    job.updated_at = now;
    match outcome {
        Ok(result) => {
            job.status = JobStatus::Completed;
            job.result = Some(result);
            job.last_error = None;
            queue.store().upsert(&job).await?;
            info!(
                job_id = %job.id,
                operation = job.operation.name(),
                attempts = job.attempts,
                "Job completed"
            );
            queue.enforce_retention().await?;
        }
        Err(e) if e.is_retryable() && job.can_retry() => {
            let delay = job.next_delay();
            job.status = JobStatus::Pending;
            job.last_error = Some(e.to_string());
            job.next_run_at = chrono::Duration::from_std(delay)
                .ok()
                .map(|d| now + d);
            queue.store().upsert(&job).await?;
            warn!(
                job_id = %job.id,
                operation = job.operation.name(),
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %e,
                "Job attempt failed, retrying"
            );
            queue.schedule(&job.id, delay);
        }
        Err(e) => {
            job.status = JobStatus::Failed;
            job.last_error = Some(e.to_string());
            queue.store().upsert(&job).await?;
            error!(
                job_id = %job.id,
                operation = job.operation.name(),
                tenant = %job.tenant_id,
                attempts = job.attempts,
                error = %e,
                payload = %pci::sanitized_json(&job.sanitized_payload()),
                "Job failed permanently"
            );
            queue.enforce_retention().await?;
        }
    }
    Ok(())
}
