//! Import API Handlers
//!
//! Placement inventory, archive upload and import job launch.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use serde::Deserialize;
use toolbox_core::domain::job::JobKind;
use toolbox_core::dto::import::{BridgeList, Inventory, StartImportRequest, UploadResponse};
use toolbox_core::dto::job::JobStarted;

use crate::api::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Multipart field carrying the archive
const ARCHIVE_FIELD: &str = "archive";

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    /// Node whose storages are listed; defaults to the first node
    pub node: Option<String>,
}

/// GET /api/import/inventory
pub async fn get_inventory(
    State(state): State<AppState>,
    Query(query): Query<InventoryQuery>,
) -> ApiResult<Json<Inventory>> {
    let outcome = state.cache.probe().await;
    if !outcome.ok {
        return Err(ApiError::Unavailable(outcome.message));
    }

    let nodes = state.control_plane.list_nodes().await?;
    let mut used_vm_ids = state.control_plane.list_vm_ids().await?;
    used_vm_ids.sort_unstable();

    let storages = match query.node.as_deref().or(nodes.first().map(String::as_str)) {
        Some(node) => state.control_plane.list_storage(node).await?,
        None => Vec::new(),
    };

    Ok(Json(Inventory {
        nodes,
        used_vm_ids,
        storages,
    }))
}

/// GET /api/import/bridges/{node}
pub async fn get_bridges(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> ApiResult<Json<BridgeList>> {
    tracing::debug!("Listing bridges on node {}", node);

    let bridges = state.control_plane.list_bridges(&node).await?;
    Ok(Json(BridgeList { node, bridges }))
}

/// POST /api/import/upload
/// Streams the `archive` field to disk and extracts its disk images
pub async fn upload_archive(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(ARCHIVE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let mut pending = state.artifacts.begin(&filename).await?;

        loop {
            let chunk = match field.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    pending.abort().await;
                    return Err(ApiError::BadRequest(e.to_string()));
                }
            };
            if let Err(e) = pending.write_chunk(&chunk).await {
                pending.abort().await;
                return Err(e.into());
            }
        }

        let archive = state.artifacts.finish(pending).await?;
        return Ok(Json(UploadResponse {
            upload_id: archive.id,
            files: archive.disk_files(),
        }));
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        ARCHIVE_FIELD
    )))
}

/// POST /api/import/start
pub async fn start_import(
    State(state): State<AppState>,
    Json(req): Json<StartImportRequest>,
) -> ApiResult<Json<JobStarted>> {
    req.plan
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let archive = state.artifacts.take(req.upload_id)?;
    let job_id = state.launcher.start_import(req.plan, archive);

    Ok(Json(JobStarted {
        job_id,
        kind: JobKind::Import,
    }))
}
