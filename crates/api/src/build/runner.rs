//! Build runner: one external build tool process per job.
//!
//! [`BuildRunner::run`] spawns the configured build command in a prepared
//! working directory and turns everything it observes into
//! [`ProgressEvent`]s on the [`EventBus`]. Job state changes only ever
//! happen through those events.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use buildhub_core::build::subprocess::{self, OutputChunk};
use buildhub_core::build::{BuildCommand, BuildError};
use buildhub_core::diagnostic::{self, ERROR_MARKER};
use buildhub_core::JobStatus;
use buildhub_events::{EventBus, ProgressEvent};
use tokio::sync::mpsc;

/// Progress reported when the build tool is about to start.
pub const BUILD_STARTED_PROGRESS: u8 = 10;

/// Output chunks nudge progress forward but never past this.
const OUTPUT_PROGRESS_CEILING: u8 = 90;

/// Maximum stdout or stderr retained per build (10 MiB).
///
/// Older output is discarded first; every chunk is still published.
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Successful build result.
#[derive(Debug, Clone)]
pub struct BuildSuccess {
    /// Accumulated stdout.
    pub output: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Output accumulated while relaying a build.
#[derive(Debug, Default)]
struct CapturedOutput {
    stdout: String,
    stderr: String,
}

/// Runs the build tool for a job and publishes its progress.
pub struct BuildRunner {
    event_bus: Arc<EventBus>,
    command: BuildCommand,
    timeout: Option<Duration>,
}

impl BuildRunner {
    pub fn new(event_bus: Arc<EventBus>, command: BuildCommand, timeout: Option<Duration>) -> Self {
        Self {
            event_bus,
            command,
            timeout,
        }
    }

    /// Build the project in `working_dir` on behalf of `job_id`.
    ///
    /// Publishes a `building` event before spawning, one event per output
    /// line while the tool runs, and exactly one terminal event at the end.
    /// The returned result mirrors that terminal event.
    pub async fn run(&self, job_id: &str, working_dir: &Path) -> Result<BuildSuccess, BuildError> {
        self.publish(
            ProgressEvent::new(
                job_id,
                JobStatus::Building,
                format!("Running {}", self.command),
            )
            .with_progress(BUILD_STARTED_PROGRESS),
        );
        tracing::info!(job_id, command = %self.command, "Build started");

        let (tx, rx) = mpsc::unbounded_channel();
        let (exit, captured) = tokio::join!(
            subprocess::run_streaming(&self.command, working_dir, self.timeout, tx),
            self.relay_output(job_id, rx),
        );

        let result = match exit {
            Ok(exit) if exit.success() => self.finish_success(job_id, captured, exit.duration_ms),
            Ok(exit) => Err(BuildError::BuildToolFailed {
                exit_code: exit.exit_code,
                diagnostic: diagnostic::parse(&captured.stderr),
                stderr: captured.stderr,
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            tracing::warn!(job_id, error = %err, "Build failed");
            self.publish(
                ProgressEvent::new(job_id, JobStatus::Failed, "Build failed")
                    .with_progress(100)
                    .with_diagnostic(err.diagnostic()),
            );
        }

        result
    }

    fn finish_success(
        &self,
        job_id: &str,
        captured: CapturedOutput,
        duration_ms: u64,
    ) -> Result<BuildSuccess, BuildError> {
        let jobs = self.event_bus.jobs();

        // A failure recorded for this job while it ran wins over exit code 0.
        if let Some(diagnostic) = jobs.get(job_id).and_then(|job| job.last_error) {
            tracing::warn!(job_id, "Build exited cleanly but the job already failed");
            return Err(BuildError::BuildToolFailed {
                exit_code: 0,
                diagnostic,
                stderr: captured.stderr,
            });
        }

        if let Err(e) = jobs.record_output(job_id, captured.stdout.clone()) {
            tracing::warn!(job_id, error = %e, "Could not record build output");
        }

        tracing::info!(job_id, duration_ms, "Build completed");
        self.publish(
            ProgressEvent::new(job_id, JobStatus::Completed, "Build completed successfully")
                .with_progress(100),
        );

        Ok(BuildSuccess {
            output: captured.stdout,
            duration_ms,
        })
    }

    /// Publish one event per output line until both streams are drained.
    async fn relay_output(
        &self,
        job_id: &str,
        mut rx: mpsc::UnboundedReceiver<OutputChunk>,
    ) -> CapturedOutput {
        let mut captured = CapturedOutput::default();
        let mut progress = BUILD_STARTED_PROGRESS;

        while let Some(chunk) = rx.recv().await {
            progress = progress.saturating_add(1).min(OUTPUT_PROGRESS_CEILING);

            let event = match chunk {
                OutputChunk::Stdout(text) => {
                    tracing::trace!(job_id, output = %text.trim_end(), "Build output");
                    push_capped(&mut captured.stdout, &text);
                    ProgressEvent::new(job_id, JobStatus::Building, "Build output")
                        .with_progress(progress)
                        .with_output_chunk(text)
                }
                OutputChunk::Stderr(text) => {
                    tracing::trace!(job_id, output = %text.trim_end(), "Build error output");
                    push_capped(&mut captured.stderr, &text);
                    error_output_event(job_id, progress, text)
                }
            };
            self.publish(event);
        }

        captured
    }

    fn publish(&self, event: ProgressEvent) {
        let job_id = event.job_id.clone();
        if let Err(e) = self.event_bus.publish(event) {
            tracing::warn!(job_id = %job_id, error = %e, "Dropped build event");
        }
    }
}

/// Event for a stderr line. Lines carrying the error marker get a
/// provisional diagnostic so observers can surface it before the build ends.
fn error_output_event(job_id: &str, progress: u8, text: String) -> ProgressEvent {
    let flagged = text.contains(ERROR_MARKER);
    let message = if flagged {
        "Compiler reported an error"
    } else {
        "Build diagnostics"
    };

    let mut event = ProgressEvent::new(job_id, JobStatus::Building, message).with_progress(progress);
    if flagged {
        event = event.with_diagnostic(diagnostic::parse(&text));
    }
    event.with_raw_error_chunk(text)
}

/// Append `text` to `buf`, discarding the oldest bytes beyond
/// [`MAX_OUTPUT_BYTES`]. The diagnostic parser reads from the end, so the
/// tail is what matters.
fn push_capped(buf: &mut String, text: &str) {
    buf.push_str(text);
    if buf.len() > MAX_OUTPUT_BYTES {
        let mut cut = buf.len() - MAX_OUTPUT_BYTES;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
