//! Request handlers.
//!
//! Handlers stay thin: they validate the request shape, delegate to the
//! orchestrator, job store or gateway held in [`AppState`](crate::state::AppState),
//! and map errors via [`AppError`](crate::error::AppError).

pub mod builds;
