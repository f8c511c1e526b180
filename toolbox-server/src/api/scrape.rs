//! Scrape API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use toolbox_core::domain::job::JobKind;
use toolbox_core::dto::job::JobStarted;
use toolbox_core::dto::scrape::{CommandMatch, StartScrapeRequest, StopScrapeResponse};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::command_service;
use crate::state::AppState;

/// POST /api/scrape/start
pub async fn start_scrape(
    State(state): State<AppState>,
    Json(req): Json<StartScrapeRequest>,
) -> Json<JobStarted> {
    let job_id = state.launcher.start_scrape(req.tasks);
    Json(JobStarted {
        job_id,
        kind: JobKind::Scrape,
    })
}

/// POST /api/scrape/{id}/stop
pub async fn stop_scrape(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StopScrapeResponse>> {
    if !state.launcher.stop_scrape(id) {
        return Err(ApiError::NotFound(format!(
            "No running scrape with id {}",
            id
        )));
    }
    Ok(Json(StopScrapeResponse { stopped: true }))
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /api/commands?q=
/// Searches the command reference saved by the last scrape
pub async fn search_commands(
    State(state): State<AppState>,
    Query(query): Query<CommandQuery>,
) -> ApiResult<Json<Vec<CommandMatch>>> {
    let matches = command_service::search(&state.config.scraper.output_path, &query.q)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    Ok(Json(matches))
}
