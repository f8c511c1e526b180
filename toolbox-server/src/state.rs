//! Shared application state
//!
//! Wires the external backends into the job engine once at startup. Every
//! handler receives a cheap clone of [`AppState`].

use std::sync::Arc;

use crate::config::Config;
use crate::proxmox::ControlPlane;
use crate::remote::SessionConnector;
use crate::service::artifacts::ArtifactStore;
use crate::service::connection::{ConnectionCache, Prober};
use crate::service::discovery::TaskDiscovery;
use crate::service::fetch::PageFetcher;
use crate::service::import::ImportWorkflow;
use crate::service::jobs::JobLauncher;
use crate::service::registry::JobRegistry;
use crate::service::scrape::ScrapePool;
use crate::service::sink::ResultSink;

/// External systems the server talks to
pub struct Backends {
    pub control_plane: Arc<dyn ControlPlane>,
    pub connector: Arc<dyn SessionConnector>,
    pub prober: Arc<dyn Prober>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub sink: Arc<dyn ResultSink>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub launcher: Arc<JobLauncher>,
    pub cache: Arc<ConnectionCache>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub artifacts: Arc<ArtifactStore>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends) -> Self {
        let Backends {
            control_plane,
            connector,
            prober,
            fetcher,
            sink,
        } = backends;

        let registry = Arc::new(JobRegistry::new(config.progress_idle_timeout));
        let cache = Arc::new(ConnectionCache::new(prober, config.probe_ttl));

        let import = Arc::new(ImportWorkflow::new(
            Arc::clone(&control_plane),
            connector,
            Arc::clone(&cache),
            config.remote_temp_base.clone(),
        ));
        let scrape = Arc::new(ScrapePool::new(
            Arc::clone(&fetcher),
            sink,
            config.scraper.workers,
        ));
        let discovery = Arc::new(TaskDiscovery::new(fetcher, &config.scraper));

        let launcher = Arc::new(JobLauncher::new(
            Arc::clone(&registry),
            import,
            scrape,
            discovery,
        ));
        let artifacts = Arc::new(ArtifactStore::new(config.upload_dir.clone()));

        Self {
            config: Arc::new(config),
            registry,
            launcher,
            cache,
            control_plane,
            artifacts,
        }
    }
}
