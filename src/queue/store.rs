//! Durable job storage.
//!
//! [`FileJobStore`] keeps the whole table in memory and rewrites a versioned
//! JSON file on every change (temp file + rename, so a crash never leaves a
//! half-written table). [`MemoryJobStore`] is the same table without the file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::job::{Job, JobStatus};
use crate::error::{PaygateError, Result};

const STORE_VERSION: u32 = 1;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Job>>;

    async fn get(&self, id: &str) -> Result<Option<Job>>;

    /// Insert or replace a job by id.
    async fn upsert(&self, job: &Job) -> Result<()>;

    async fn remove(&self, id: &str) -> Result<bool>;

    /// Jobs with `status` (all when `None`), oldest first.
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;

    /// Drop the oldest jobs in `status` beyond the newest `keep`. Returns the
    /// number removed.
    async fn prune(&self, status: JobStatus, keep: usize) -> Result<usize>;
}

#[derive(Debug, Default)]
struct JobTable {
    jobs: HashMap<String, Job>,
}

impl JobTable {
    fn from_jobs(jobs: Vec<Job>) -> Self {
        Self {
            jobs: jobs.into_iter().map(|j| (j.id.clone(), j)).collect(),
        }
    }

    fn sorted(&self, status: Option<JobStatus>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| s == j.status))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        jobs
    }

    fn prune(&mut self, status: JobStatus, keep: usize) -> usize {
        let mut matching: Vec<(String, chrono::DateTime<chrono::Utc>)> = self
            .jobs
            .values()
            .filter(|j| j.status == status)
            .map(|j| (j.id.clone(), j.updated_at))
            .collect();
        if matching.len() <= keep {
            return 0;
        }
        matching.sort_by(|a, b| a.1.cmp(&b.1));
        let excess = matching.len() - keep;
        for (id, _) in matching.into_iter().take(excess) {
            self.jobs.remove(&id);
        }
        excess
    }
}

// ============================================================================
// Memory
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    table: Mutex<JobTable>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn load_all(&self) -> Result<Vec<Job>> {
        Ok(self.table().sorted(None))
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.table().jobs.get(id).cloned())
    }

    async fn upsert(&self, job: &Job) -> Result<()> {
        self.table().jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.table().jobs.remove(id).is_some())
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        Ok(self.table().sorted(status))
    }

    async fn prune(&self, status: JobStatus, keep: usize) -> Result<usize> {
        Ok(self.table().prune(status, keep))
    }
}

// ============================================================================
// File
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct JobFile {
    version: u32,
    jobs: Vec<Job>,
}

pub struct FileJobStore {
    path: PathBuf,
    table: tokio::sync::Mutex<JobTable>,
}

impl FileJobStore {
    /// Open the store at `path`, loading existing jobs. A missing file is an
    /// empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read_to_string(&path).await?;
            let file: JobFile = serde_json::from_str(&content)?;
            if file.version != STORE_VERSION {
                return Err(PaygateError::Queue(format!(
                    "unsupported job store version {} in {}",
                    file.version,
                    path.display()
                )));
            }
            JobTable::from_jobs(file.jobs)
        } else {
            JobTable::default()
        };
        Ok(Self {
            path,
            table: tokio::sync::Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &JobTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = JobFile {
            version: STORE_VERSION,
            jobs: table.sorted(None),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn load_all(&self) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.sorted(None))
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        Ok(self.table.lock().await.jobs.get(id).cloned())
    }

    async fn upsert(&self, job: &Job) -> Result<()> {
        let mut table = self.table.lock().await;
        table.jobs.insert(job.id.clone(), job.clone());
        self.persist(&table).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut table = self.table.lock().await;
        let removed = table.jobs.remove(id).is_some();
        if removed {
            self.persist(&table).await?;
        }
        Ok(removed)
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        Ok(self.table.lock().await.sorted(status))
    }

    async fn prune(&self, status: JobStatus, keep: usize) -> Result<usize> {
        let mut table = self.table.lock().await;
        let removed = table.prune(status, keep);
        if removed > 0 {
            self.persist(&table).await?;
        }
        Ok(removed)
    }
}
