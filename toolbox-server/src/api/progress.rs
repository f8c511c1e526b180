//! Progress stream handler
//!
//! Serves one job's progress events as server-sent events. Each frame carries
//! the event status as its SSE event name and the JSON event as its data.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::Stream;
use std::convert::Infallible;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/jobs/{id}/progress
///
/// 404 if the job is unknown or another consumer already attached.
pub async fn stream_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let mut drain = state
        .registry
        .drain(id)
        .ok_or_else(|| ApiError::NotFound(format!("No progress stream for job {}", id)))?;

    let stream = async_stream::stream! {
        while let Some(event) = drain.next().await {
            match Event::default().event(event.status.as_str()).json_data(&event) {
                Ok(frame) => yield Ok::<_, Infallible>(frame),
                Err(e) => tracing::warn!("Dropping unencodable progress event for job {}: {}", id, e),
            }
        }
        tracing::debug!("Progress stream for {} job {} ended", drain.kind(), drain.job_id());
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
