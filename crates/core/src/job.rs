//! Build job model and lifecycle rules.
//!
//! A job moves `pending -> preparing -> building -> completed | failed`.
//! [`Job::apply`] is the single place that decides whether a proposed status
//! change is accepted; [`JobStore`](crate::store::JobStore) calls it under
//! the job's lock.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::Diagnostic;
use crate::types::{JobId, Timestamp};

/// Lifecycle status of a build job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Preparing,
    Building,
    Completed,
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Building => "building",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Position in the lifecycle. Both terminal statuses share the last rank.
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Preparing => 1,
            Self::Building => 2,
            Self::Completed | Self::Failed => 3,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of proposing a status change to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The job moved to the proposed status.
    Applied,
    /// The job is already in the proposed non-terminal status (e.g. another
    /// output chunk while `building`). Nothing changed.
    Unchanged,
    /// The job is already in the proposed terminal status. Re-delivery of a
    /// terminal signal is tolerated and ignored.
    Duplicate,
    /// The change was refused: the job is terminal, the status would move
    /// backwards, or a success would mask a recorded failure.
    Rejected,
}

impl TransitionOutcome {
    /// Whether an event proposing this change should reach observers.
    pub fn is_deliverable(self) -> bool {
        matches!(self, Self::Applied | Self::Unchanged)
    }
}

/// In-memory state of one build job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Exercise (template) the submission was built against.
    pub exercise: String,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set once, on the failure path. Sticky.
    pub last_error: Option<Diagnostic>,
    /// Accumulated stdout of a successful build.
    pub output: Option<String>,
}

impl Job {
    pub fn new(id: JobId, exercise: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            exercise: exercise.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            last_error: None,
            output: None,
        }
    }

    /// Propose moving this job to `status`.
    ///
    /// Terminal jobs accept nothing but a re-delivery of the same terminal
    /// status (reported as [`TransitionOutcome::Duplicate`]). A `completed`
    /// proposal is rejected whenever a failure has been recorded, so a late
    /// success signal can never overwrite it.
    pub fn apply(&mut self, status: JobStatus, diagnostic: Option<Diagnostic>) -> TransitionOutcome {
        if self.status.is_terminal() {
            return if self.status == status {
                TransitionOutcome::Duplicate
            } else {
                TransitionOutcome::Rejected
            };
        }

        if status == JobStatus::Completed && self.last_error.is_some() {
            return TransitionOutcome::Rejected;
        }

        if status == self.status {
            return TransitionOutcome::Unchanged;
        }

        if status.rank() < self.status.rank() {
            return TransitionOutcome::Rejected;
        }

        if status == JobStatus::Failed {
            self.last_error = Some(
                diagnostic.unwrap_or_else(|| Diagnostic::from_message("Build failed")),
            );
        }

        self.status = status;
        self.updated_at = chrono::Utc::now();
        TransitionOutcome::Applied
    }

    /// `Some(true)`/`Some(false)` once terminal, `None` while in flight.
    pub fn success(&self) -> Option<bool> {
        match self.status {
            JobStatus::Completed => Some(true),
            JobStatus::Failed => Some(false),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            exercise: self.exercise.clone(),
            status: self.status,
            success: self.success(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_error: self.last_error.clone(),
            output: self.output.clone(),
        }
    }
}

/// Serializable view of a job returned by status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub exercise: String,
    pub status: JobStatus,
    pub success: Option<bool>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_error: Option<Diagnostic>,
    pub output: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
