//! Build job orchestrator.
//!
//! Accepts submissions, allocates job ids, and hands the actual work to a
//! supervised background task. Held in [`AppState`](crate::state::AppState)
//! as an `Arc<BuildOrchestrator>`.

use std::sync::Arc;

use buildhub_core::build::{BuildError, TemplateWorkspace};
use buildhub_core::{Diagnostic, JobId, JobStatus, JobStore};
use buildhub_events::{EventBus, ProgressEvent};

use super::runner::BuildRunner;

/// Progress reported while the working directory is being prepared.
pub const PREPARING_PROGRESS: u8 = 5;

/// Orchestrates build jobs from submission to terminal event.
///
/// Manages the full lifecycle:
/// 1. Validate the submission and the exercise.
/// 2. Register a `pending` job.
/// 3. In the background: prepare the working copy (`preparing`).
/// 4. Run the build tool (`building`).
/// 5. Publish the outcome (`completed` / `failed`).
///
/// Only steps 1 and 2 can fail the caller; everything afterwards is
/// reported through the job's event stream.
pub struct BuildOrchestrator {
    jobs: Arc<JobStore>,
    event_bus: Arc<EventBus>,
    workspace: TemplateWorkspace,
    runner: Arc<BuildRunner>,
}

impl BuildOrchestrator {
    pub fn new(
        jobs: Arc<JobStore>,
        event_bus: Arc<EventBus>,
        workspace: TemplateWorkspace,
        runner: Arc<BuildRunner>,
    ) -> Self {
        Self {
            jobs,
            event_bus,
            workspace,
            runner,
        }
    }

    /// Accept `source` for `exercise` and start building it.
    ///
    /// Returns as soon as the job is registered; the build itself runs on a
    /// spawned task. Must be called from within a Tokio runtime.
    pub fn submit(&self, exercise: &str, source: &str) -> Result<JobId, BuildError> {
        if source.trim().is_empty() {
            return Err(BuildError::InvalidInput("No code provided".to_string()));
        }
        self.workspace.ensure_exercise(exercise)?;

        let job_id = self.jobs.create(exercise);
        tracing::info!(job_id = %job_id, exercise, source_bytes = source.len(), "Build job created");

        self.spawn_supervised(job_id.clone(), exercise.to_string(), source.to_string());
        Ok(job_id)
    }

    /// Run the job on its own task, with a watcher that turns a panic or
    /// abort of that task into a `failed` event.
    fn spawn_supervised(&self, job_id: JobId, exercise: String, source: String) {
        let build = BuildTask {
            event_bus: Arc::clone(&self.event_bus),
            workspace: self.workspace.clone(),
            runner: Arc::clone(&self.runner),
            job_id: job_id.clone(),
            exercise,
            source,
        };
        let handle = tokio::spawn(build.execute());

        let event_bus = Arc::clone(&self.event_bus);
        tokio::spawn(async move {
            if let Err(join_err) = handle.await {
                tracing::error!(job_id = %job_id, error = %join_err, "Build task aborted");
                let event = ProgressEvent::new(&job_id, JobStatus::Failed, "Build task aborted")
                    .with_progress(100)
                    .with_diagnostic(Diagnostic::from_message(format!(
                        "Build task aborted unexpectedly: {join_err}"
                    )));
                if let Err(e) = event_bus.publish(event) {
                    tracing::warn!(job_id = %job_id, error = %e, "Could not record aborted build");
                }
            }
        });
    }
}

/// Everything the background half of a job needs, owned.
struct BuildTask {
    event_bus: Arc<EventBus>,
    workspace: TemplateWorkspace,
    runner: Arc<BuildRunner>,
    job_id: JobId,
    exercise: String,
    source: String,
}

impl BuildTask {
    async fn execute(self) {
        self.publish(
            ProgressEvent::new(&self.job_id, JobStatus::Preparing, "Preparing build workspace")
                .with_progress(PREPARING_PROGRESS),
        );

        let working_dir = match self
            .workspace
            .prepare(&self.exercise, &self.job_id, &self.source)
            .await
        {
            Ok(dir) => dir,
            Err(err) => {
                tracing::warn!(job_id = %self.job_id, error = %err, "Workspace preparation failed");
                self.publish(
                    ProgressEvent::new(
                        &self.job_id,
                        JobStatus::Failed,
                        format!("Preparation failed: {err}"),
                    )
                    .with_progress(100)
                    .with_diagnostic(err.diagnostic()),
                );
                return;
            }
        };

        // The runner publishes the terminal event itself.
        match self.runner.run(&self.job_id, &working_dir).await {
            Ok(success) => {
                tracing::debug!(job_id = %self.job_id, duration_ms = success.duration_ms, "Build task finished");
            }
            Err(err) => {
                tracing::debug!(job_id = %self.job_id, error = %err, "Build task finished with failure");
            }
        }
    }

    fn publish(&self, event: ProgressEvent) {
        if let Err(e) = self.event_bus.publish(event) {
            tracing::warn!(job_id = %self.job_id, error = %e, "Dropped build event");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
