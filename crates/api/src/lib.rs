//! Buildhub API server library.
//!
//! Exposes the building blocks (config, state, error handling, routes, build
//! execution, event streaming) so integration tests and the binary entrypoint
//! can both access them.

pub mod background;
pub mod build;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
