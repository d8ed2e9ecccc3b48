//! Buildhub progress events.
//!
//! - [`ProgressEvent`] - the envelope describing one step of a build job.
//! - [`EventBus`] - per-job publish/subscribe hub that routes events to the
//!   observers of a single job and keeps the [`JobStore`] in step.
//!
//! [`JobStore`]: buildhub_core::JobStore

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventSink, Subscription, SubscriptionHandle, DEFAULT_CLOSE_GRACE};
pub use event::ProgressEvent;
