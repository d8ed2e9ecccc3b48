//! Periodic eviction of finished build jobs.
//!
//! Completed and failed jobs stay queryable for the configured retention
//! period, then are dropped from the [`JobStore`] and their working
//! directories are deleted. Jobs that are still running are never touched.

use std::sync::Arc;
use std::time::Duration;

use buildhub_core::build::TemplateWorkspace;
use buildhub_core::JobStore;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// How often the eviction pass runs.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run the job retention loop until `cancel` is triggered.
pub async fn run(
    jobs: Arc<JobStore>,
    workspace: TemplateWorkspace,
    retention: Duration,
    cancel: CancellationToken,
) {
    run_every(jobs, workspace, retention, CLEANUP_INTERVAL, cancel).await;
}

async fn run_every(
    jobs: Arc<JobStore>,
    workspace: TemplateWorkspace,
    retention: Duration,
    every: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_secs = retention.as_secs(),
        interval_secs = every.as_secs(),
        "Job retention task started"
    );

    let retention = match chrono::Duration::from_std(retention) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "Job retention period out of range, task disabled");
            return;
        }
    };
    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - retention;
                let evicted = jobs.evict_terminal_older_than(cutoff);
                if evicted.is_empty() {
                    tracing::debug!("Job retention: nothing to evict");
                    continue;
                }
                for job_id in &evicted {
                    if let Err(e) = workspace.cleanup(job_id).await {
                        tracing::warn!(job_id = %job_id, error = %e, "Job retention: failed to remove working directory");
                    }
                }
                tracing::info!(
                    evicted = evicted.len(),
                    remaining = jobs.len(),
                    "Job retention: evicted finished jobs"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
