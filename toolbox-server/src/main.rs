//! Toolbox Server
//!
//! Operator console backend: runs VM import and documentation scrape jobs in
//! the background and streams their progress to the browser or CLI.
//!
//! Architecture:
//! - Configuration: environment variables with defaults
//! - Remote: SSH sessions to the hypervisor host (commands and SFTP)
//! - Proxmox: control-plane REST client
//! - Service: job registry, workflows, scrape pool and connection cache
//! - API: axum handlers and the SSE progress stream

mod api;
mod config;
mod error;
mod proxmox;
mod remote;
mod service;
mod state;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::proxmox::{ControlPlane, ProxmoxClient};
use crate::remote::{SessionConnector, SshConnector};
use crate::service::connection::StandardProber;
use crate::service::fetch::HttpFetcher;
use crate::service::sink::JsonFileSink;
use crate::state::{AppState, Backends};

/// Tool that must exist on the hypervisor host for imports
const REQUIRED_REMOTE_TOOL: &str = "qm";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toolbox_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Toolbox Server...");

    let config = load_config()?;
    info!(
        "Loaded configuration: bind_addr={}, upload_dir={}",
        config.bind_addr,
        config.upload_dir.display()
    );

    let missing = config.proxmox.missing();
    if !missing.is_empty() {
        warn!(
            "Proxmox settings incomplete ({}); imports will fail until they are set",
            missing.join(", ")
        );
    }

    let control_plane: Arc<dyn ControlPlane> = Arc::new(
        ProxmoxClient::new(&config.proxmox).context("Failed to build the Proxmox client")?,
    );
    let connector: Arc<dyn SessionConnector> = Arc::new(SshConnector::new(config.ssh.clone()));
    let prober = Arc::new(StandardProber::new(
        config.proxmox.clone(),
        Arc::clone(&control_plane),
        Arc::clone(&connector),
        REQUIRED_REMOTE_TOOL,
    ));
    let fetcher = Arc::new(
        HttpFetcher::new(config.scraper.request_timeout, &config.scraper.user_agent)
            .context("Failed to build the HTTP fetcher")?,
    );
    let sink = Arc::new(JsonFileSink::new(config.scraper.output_path.clone()));

    let addr = config.bind_addr.clone();
    let state = AppState::new(
        config,
        Backends {
            control_plane,
            connector,
            prober,
            fetcher,
            sink,
        },
    );

    // Build router with all API endpoints
    let app = api::create_router(state);

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            warn!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}
