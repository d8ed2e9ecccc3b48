//! Route definitions for build endpoints.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::builds;
use crate::state::AppState;

/// Build routes, mounted under `/api/v1`.
///
/// ```text
/// POST   /exercises/{exercise}/builds     -> submit_build
/// GET    /builds/{job_id}                 -> get_build
/// GET    /builds/{job_id}/events          -> stream_build_events
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/exercises/{exercise}/builds", post(builds::submit_build))
        .route("/builds/{job_id}", get(builds::get_build))
        .route("/builds/{job_id}/events", get(builds::stream_build_events))
}
