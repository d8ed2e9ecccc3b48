pub mod builds;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /exercises/{exercise}/builds                     submit a build (POST)
///
/// /builds/{job_id}                                 job status (GET)
/// /builds/{job_id}/events                          NDJSON event stream (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(builds::router())
}
