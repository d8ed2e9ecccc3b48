//! Handlers for build submission, status queries and event streams.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use buildhub_core::{JobId, JobSnapshot, JobStatus};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::gateway;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for a build submission.
#[derive(Debug, Deserialize)]
pub struct SubmitBuildRequest {
    /// Source text to inject into the exercise template.
    #[serde(default)]
    pub code: String,
}

/// Returned when a build has been accepted.
#[derive(Debug, Serialize)]
pub struct SubmittedBuild {
    pub job_id: JobId,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /exercises/{exercise}/builds
///
/// Accept a submission and start building it in the background. Progress is
/// available from the job's event stream. A missing or malformed body is a
/// JSON `BAD_REQUEST`.
pub async fn submit_build(
    State(state): State<AppState>,
    Path(exercise): Path<String>,
    body: Result<Json<SubmitBuildRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<SubmittedBuild>>)> {
    let Json(input) = body?;
    let job_id = state.orchestrator.submit(&exercise, &input.code)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SubmittedBuild {
                job_id,
                status: JobStatus::Pending,
            },
        }),
    ))
}

/// GET /builds/{job_id}
pub async fn get_build(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobSnapshot>>> {
    let snapshot = state.jobs.snapshot(&job_id)?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /builds/{job_id}/events
///
/// Newline-delimited JSON stream of the job's progress events.
pub async fn stream_build_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    Ok(gateway::ndjson_response(&state.event_bus, &job_id)?)
}
