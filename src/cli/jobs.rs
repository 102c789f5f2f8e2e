//! Job queue administration commands.
//!
//! These operate on the job store file directly; no workers are started, so
//! a retried job is persisted as pending and picked up by the next process
//! that runs the pool.

use anyhow::Result;
use std::sync::Arc;

use paygate::config::Config;
use paygate::queue::{FileJobStore, JobQueue, JobStatus};
use paygate::utils::SystemClock;

use super::JobsAction;

fn parse_status(raw: Option<String>) -> Result<Option<JobStatus>> {
    Ok(match raw {
        Some(s) => Some(s.parse()?),
        None => None,
    })
}

pub(crate) async fn cmd_jobs(config: &Config, action: JobsAction) -> Result<()> {
    let store = FileJobStore::open(config.job_store_path()).await?;
    let queue = JobQueue::new(
        Arc::new(store),
        config.queue.clone(),
        Arc::new(SystemClock),
    );

    match action {
        JobsAction::List { status } => {
            let jobs = queue.list(parse_status(status)?).await?;
            if jobs.is_empty() {
                println!("No jobs.");
                return Ok(());
            }
            println!(
                "{:<36}  {:<14}  {:<9}  {:>8}  UPDATED",
                "ID", "OPERATION", "STATUS", "ATTEMPTS"
            );
            for job in &jobs {
                println!(
                    "{:<36}  {:<14}  {:<9}  {:>4}/{:<3}  {}",
                    job.id,
                    job.operation.name(),
                    job.status.to_string(),
                    job.attempts,
                    job.max_attempts,
                    job.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            println!();
            println!("{} job(s)", jobs.len());
        }
        JobsAction::Show { id } => match queue.get(&id).await? {
            Some(job) => {
                println!("Job:        {}", job.id);
                println!("Operation:  {}", job.operation.name());
                println!("Tenant:     {}", job.tenant_id);
                println!("Status:     {}", job.status);
                println!("Attempts:   {}/{}", job.attempts, job.max_attempts);
                if let Some(next) = job.next_run_at {
                    println!("Next run:   {}", next.to_rfc3339());
                }
                if let Some(err) = &job.last_error {
                    println!("Last error: {}", err);
                }
                println!("Payload:");
                println!("{}", serde_json::to_string_pretty(&job.sanitized_payload())?);
                if let Some(result) = &job.result {
                    println!("Result:");
                    println!("{}", serde_json::to_string_pretty(result)?);
                }
            }
            None => {
                println!("Job '{}' not found.", id);
                std::process::exit(1);
            }
        },
        JobsAction::Retry { id } => {
            let handle = queue.retry(&id).await?;
            println!("Re-queued {} ({})", handle.id, handle.operation);
        }
        JobsAction::Purge { status } => {
            let removed = queue.purge(parse_status(status)?).await?;
            println!("Removed {} job(s).", removed);
        }
    }
    Ok(())
}
