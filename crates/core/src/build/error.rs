//! Failure taxonomy of a build job.

use std::path::PathBuf;

use crate::diagnostic::Diagnostic;

/// Errors raised while accepting, preparing, or running a build.
///
/// `InvalidInput` and `UnknownExercise` are raised before a job exists and
/// reach the submitter directly. Everything else happens after the job id
/// has been handed out and is only ever reported as a `failed` event.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown exercise: {0}")]
    UnknownExercise(String),

    #[error("Template markers not found in {}", path.display())]
    TemplateMarkerNotFound { path: PathBuf },

    #[error("Failed to prepare working directory {}: {source}", path.display())]
    WorkingDirectoryPrepFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Build failed with exit code {exit_code}: {}", diagnostic.message)]
    BuildToolFailed {
        exit_code: i32,
        diagnostic: Diagnostic,
        stderr: String,
    },

    #[error("Build tool could not be run: {0}")]
    BuildToolCrashed(#[source] std::io::Error),

    #[error("Build timed out after {elapsed_ms}ms")]
    TimedOut { elapsed_ms: u64 },
}

impl BuildError {
    /// The diagnostic to attach to the job's `failed` event.
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            Self::BuildToolFailed { diagnostic, .. } => diagnostic.clone(),
            other => Diagnostic::from_message(other.to_string()),
        }
    }
}
