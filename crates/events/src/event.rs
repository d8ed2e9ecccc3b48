//! Progress event envelope.

use buildhub_core::{Diagnostic, JobId, JobStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// A single progress report for one build job.
///
/// Constructed via [`ProgressEvent::new`] and enriched with the builder
/// methods. Events are immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,

    /// Status the job is in (or moving to) with this event.
    pub status: JobStatus,

    /// Human-readable summary.
    pub message: String,

    /// 0..=100. Meant to grow over a job's lifetime but not enforced.
    pub progress: u8,

    /// Raw slice of build tool stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_chunk: Option<String>,

    /// Raw slice of build tool stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_error_chunk: Option<String>,

    /// Structured error. Final on `failed` events, provisional on `building`
    /// events that carry a stderr chunk with an error marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,

    pub timestamp: Timestamp,
}

impl ProgressEvent {
    pub fn new(job_id: impl Into<JobId>, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            message: message.into(),
            progress: 0,
            output_chunk: None,
            raw_error_chunk: None,
            diagnostic: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Set the progress percentage, clamped to 100.
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = progress.min(100);
        self
    }

    pub fn with_output_chunk(mut self, chunk: impl Into<String>) -> Self {
        self.output_chunk = Some(chunk.into());
        self
    }

    pub fn with_raw_error_chunk(mut self, chunk: impl Into<String>) -> Self {
        self.raw_error_chunk = Some(chunk.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_optional_fields() {
        let event = ProgressEvent::new("job-1", JobStatus::Building, "Build output")
            .with_progress(150)
            .with_output_chunk("Compiling\n");

        assert_eq!(event.progress, 100);
        assert_eq!(event.output_chunk.as_deref(), Some("Compiling\n"));
        assert!(event.raw_error_chunk.is_none());
        assert!(!event.is_terminal());
    }

    #[test]
    fn serializes_without_absent_fields() {
        let event = ProgressEvent::new("job-1", JobStatus::Completed, "done").with_progress(100);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["job_id"], "job-1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["progress"], 100);
        assert!(json.get("output_chunk").is_none());
        assert!(json.get("diagnostic").is_none());
    }

    #[test]
    fn failed_event_carries_diagnostic() {
        let event = ProgressEvent::new("job-1", JobStatus::Failed, "Build failed")
            .with_diagnostic(Diagnostic::from_message("boom"));
        let json = serde_json::to_value(&event).unwrap();

        assert!(event.is_terminal());
        assert_eq!(json["diagnostic"]["message"], "boom");
        assert!(json["diagnostic"]["line"].is_null());
    }
}
