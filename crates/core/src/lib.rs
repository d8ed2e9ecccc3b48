//! Buildhub domain core.
//!
//! Pure building blocks of the build-job service, free of any HTTP or event
//! delivery concerns:
//!
//! - [`diagnostic`] - turns raw compiler stderr into a [`Diagnostic`].
//! - [`job`] - job lifecycle and the transition rules.
//! - [`store`] - the in-memory [`JobStore`].
//! - [`build`] - template workspaces, the build command, and streaming
//!   subprocess execution.

pub mod build;
pub mod diagnostic;
pub mod error;
pub mod job;
pub mod store;
pub mod types;

pub use diagnostic::Diagnostic;
pub use error::CoreError;
pub use job::{Job, JobSnapshot, JobStatus, TransitionOutcome};
pub use store::JobStore;
pub use types::{JobId, Timestamp};
