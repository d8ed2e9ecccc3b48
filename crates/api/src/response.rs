//! JSON envelope shared by the non-streaming build endpoints.
//!
//! Submission and status responses are wrapped as `{ "data": ... }`; errors
//! use the `{ "error", "code" }` shape from [`AppError`](crate::error::AppError)
//! and event streams are raw NDJSON, so neither goes through this type.

use serde::Serialize;

/// `{ "data": T }` wrapper for a successful JSON payload.
///
/// ```ignore
/// Ok(Json(DataResponse { data: state.jobs.snapshot(&job_id)? }))
/// ```
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
