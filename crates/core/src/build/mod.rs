//! Build execution primitives.
//!
//! Everything here is free of job bookkeeping: preparing a working copy of a
//! template, describing the build tool invocation, and running it while
//! streaming its output. The API crate wires these into jobs and events.

pub mod command;
pub mod error;
pub mod subprocess;
pub mod template;

pub use command::BuildCommand;
pub use error::BuildError;
pub use subprocess::{OutputChunk, ProcessExit};
pub use template::TemplateWorkspace;
