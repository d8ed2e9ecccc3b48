//! In-memory job table.
//!
//! [`JobStore`] owns the canonical status of every live build job. The map
//! itself sits behind an `RwLock` that is only held long enough to find or
//! insert an entry; each job has its own `Mutex`, so transitions for
//! different jobs never wait on each other while transitions for the same
//! job are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::job::{Job, JobSnapshot, JobStatus, TransitionOutcome};
use crate::types::{new_job_id, JobId, Timestamp};

type JobCell = Arc<Mutex<Job>>;

/// Thread-safe table of build jobs keyed by [`JobId`].
///
/// Designed to be shared as `Arc<JobStore>`.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, JobCell>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new `pending` job for `exercise` and return its id.
    pub fn create(&self, exercise: &str) -> JobId {
        let id = new_job_id(exercise);
        let job = Job::new(id.clone(), exercise);
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Arc::new(Mutex::new(job)));
        tracing::debug!(job_id = %id, exercise, "Job registered");
        id
    }

    /// Clone of the job's current state, or `None` for unknown ids.
    pub fn get(&self, id: &str) -> Option<Job> {
        self.cell(id).map(|cell| lock(&cell).clone())
    }

    pub fn snapshot(&self, id: &str) -> Result<JobSnapshot, CoreError> {
        self.cell(id)
            .map(|cell| lock(&cell).snapshot())
            .ok_or_else(|| CoreError::job_not_found(id))
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.cell(id).map(|cell| lock(&cell).status)
    }

    /// Atomically propose a status change. See [`Job::apply`] for the rules.
    ///
    /// Refused changes are not errors: they come back as
    /// [`TransitionOutcome::Duplicate`] or [`TransitionOutcome::Rejected`]
    /// and leave the job untouched.
    pub fn transition(
        &self,
        id: &str,
        status: JobStatus,
        diagnostic: Option<Diagnostic>,
    ) -> Result<TransitionOutcome, CoreError> {
        let cell = self.cell(id).ok_or_else(|| CoreError::job_not_found(id))?;
        let mut job = lock(&cell);
        let from = job.status;
        let outcome = job.apply(status, diagnostic);

        match outcome {
            TransitionOutcome::Applied => {
                tracing::debug!(job_id = %id, %from, to = %status, "Job transitioned");
            }
            TransitionOutcome::Rejected => {
                tracing::warn!(job_id = %id, %from, to = %status, "Job transition rejected");
            }
            TransitionOutcome::Unchanged | TransitionOutcome::Duplicate => {}
        }

        Ok(outcome)
    }

    /// Attach the accumulated stdout of a build.
    pub fn record_output(&self, id: &str, output: impl Into<String>) -> Result<(), CoreError> {
        let cell = self.cell(id).ok_or_else(|| CoreError::job_not_found(id))?;
        lock(&cell).output = Some(output.into());
        Ok(())
    }

    /// Drop terminal jobs last updated before `cutoff` and return their
    /// ids. In-flight jobs are never evicted.
    pub fn evict_terminal_older_than(&self, cutoff: Timestamp) -> Vec<JobId> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let mut evicted = Vec::new();
        jobs.retain(|id, cell| {
            let job = lock(cell);
            let expired = job.status.is_terminal() && job.updated_at < cutoff;
            if expired {
                evicted.push(id.clone());
            }
            !expired
        });
        evicted
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell(&self, id: &str) -> Option<JobCell> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

fn lock(cell: &Mutex<Job>) -> MutexGuard<'_, Job> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
