//! Connection API Handlers

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use toolbox_core::dto::connection::ConnectionStatus;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Report the last outcome without probing, even if it is stale
    #[serde(default)]
    pub cached: bool,
}

/// GET /api/connection
/// Cached probe outcome, probing first if it went stale
///
/// With `?cached=true` nothing is probed; 404 if no probe has completed yet.
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<ConnectionStatus>> {
    let outcome = if query.cached {
        state
            .cache
            .peek()
            .await
            .ok_or_else(|| ApiError::NotFound("No connection probe has completed yet".to_string()))?
    } else {
        state.cache.probe().await
    };

    Ok(Json(outcome.to_status()))
}

/// POST /api/connection/invalidate
pub async fn invalidate(State(state): State<AppState>) -> StatusCode {
    state.cache.invalidate().await;
    StatusCode::NO_CONTENT
}
