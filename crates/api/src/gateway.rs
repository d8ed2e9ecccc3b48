//! Subscription gateway: exposes a job's event stream over HTTP.
//!
//! Each request gets its own [`EventBus`] subscription, rendered as
//! newline-delimited JSON. The stream ends when the bus drops the sink
//! (terminal event plus grace period, or immediately for finished jobs).
//! If the client goes away first, dropping the response body drops the
//! [`SubscriptionGuard`], which unsubscribes.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use buildhub_core::CoreError;
use buildhub_events::{EventBus, ProgressEvent, SubscriptionHandle};
use futures::{future, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Content type of the event stream.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Removes its subscription from the bus when dropped.
pub struct SubscriptionGuard {
    event_bus: Arc<EventBus>,
    handle: SubscriptionHandle,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if self.event_bus.unsubscribe(&self.handle) {
            tracing::debug!(job_id = %self.handle.job_id(), "Stream client went away, unsubscribed");
        }
    }
}

/// Subscribe to `job_id` and return the events as a stream.
///
/// The subscription lives as long as the returned stream.
pub fn event_stream(
    event_bus: &Arc<EventBus>,
    job_id: &str,
) -> Result<impl Stream<Item = ProgressEvent> + Send + 'static, CoreError> {
    let (sink, receiver) = mpsc::unbounded_channel();
    let handle = event_bus.subscribe(job_id, sink)?;
    let guard = SubscriptionGuard {
        event_bus: Arc::clone(event_bus),
        handle,
    };

    Ok(UnboundedReceiverStream::new(receiver).map(move |event| {
        let _ = &guard;
        event
    }))
}

/// Build a streaming NDJSON response for `job_id`.
///
/// Unknown jobs are returned as an error before any body is produced, so
/// the caller can still answer with a 404.
pub fn ndjson_response(event_bus: &Arc<EventBus>, job_id: &str) -> Result<Response, CoreError> {
    let lines = event_stream(event_bus, job_id)?
        .filter_map(|event| future::ready(encode_line(&event)))
        .map(Ok::<_, Infallible>);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// One event as a JSON line.
fn encode_line(event: &ProgressEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(mut line) => {
            line.push('\n');
            Some(line)
        }
        Err(e) => {
            tracing::error!(job_id = %event.job_id, error = %e, "Failed to encode progress event");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
