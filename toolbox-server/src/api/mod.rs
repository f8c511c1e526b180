//! API Module
//!
//! HTTP API layer for the toolbox console.
//! Each submodule handles endpoints for a specific domain.

pub mod connection;
pub mod error;
pub mod health;
pub mod import;
pub mod progress;
pub mod scrape;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Connection endpoints
        .route("/api/connection", get(connection::get_status))
        .route("/api/connection/invalidate", post(connection::invalidate))
        // Import endpoints
        .route("/api/import/inventory", get(import::get_inventory))
        .route("/api/import/bridges/{node}", get(import::get_bridges))
        .route(
            "/api/import/upload",
            post(import::upload_archive).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/import/start", post(import::start_import))
        // Scrape endpoints
        .route("/api/scrape/start", post(scrape::start_scrape))
        .route("/api/scrape/{id}/stop", post(scrape::stop_scrape))
        .route("/api/commands", get(scrape::search_commands))
        // Job progress
        .route("/api/jobs/{id}/progress", get(progress::stream_progress))
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
