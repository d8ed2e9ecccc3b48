//! Build execution: the runner that drives the build tool and the
//! orchestrator that turns submissions into supervised jobs.

pub mod orchestrator;
pub mod runner;

pub use orchestrator::BuildOrchestrator;
pub use runner::{BuildRunner, BuildSuccess};
