//! Connection cache
//!
//! Memoizes the outcome of a control-plane connectivity probe for a freshness
//! window. Successes and failures are cached alike; `invalidate` forces the
//! next caller to probe again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use toolbox_core::dto::connection::ConnectionStatus;
use tracing::{debug, info, warn};

use crate::config::ProxmoxSettings;
use crate::proxmox::ControlPlane;
use crate::remote::{CommandOutput, SessionConnector, sh_escape};

/// Result of one live probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// The control plane answered
    pub ok: bool,
    pub message: String,
    /// The required tool was found on the remote host
    pub remote_tool_available: bool,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            remote_tool_available: true,
            checked_at: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            remote_tool_available: false,
            checked_at: Utc::now(),
        }
    }

    /// Both the control plane and the remote tooling are usable
    pub fn is_ready(&self) -> bool {
        self.ok && self.remote_tool_available
    }

    pub fn to_status(&self) -> ConnectionStatus {
        ConnectionStatus {
            ok: self.ok,
            message: self.message.clone(),
            remote_tool_available: self.remote_tool_available,
            checked_at: self.checked_at,
        }
    }
}

/// Performs a live connectivity check
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self) -> ProbeOutcome;
}

struct CachedProbe {
    at: Instant,
    outcome: ProbeOutcome,
}

pub struct ConnectionCache {
    prober: Arc<dyn Prober>,
    ttl: Duration,
    slot: Mutex<Option<CachedProbe>>,
}

impl ConnectionCache {
    pub fn new(prober: Arc<dyn Prober>, ttl: Duration) -> Self {
        Self {
            prober,
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Cached outcome if still fresh, otherwise a live probe
    ///
    /// Callers are serialized on the slot, so concurrent requests share one probe.
    pub async fn probe(&self) -> ProbeOutcome {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if cached.at.elapsed() < self.ttl {
                debug!("Using cached connection probe ({:?} old)", cached.at.elapsed());
                return cached.outcome.clone();
            }
        }

        let outcome = self.prober.probe().await;
        if outcome.ok {
            info!("Connection probe succeeded: {}", outcome.message);
        } else {
            warn!("Connection probe failed: {}", outcome.message);
        }

        *slot = Some(CachedProbe {
            at: Instant::now(),
            outcome: outcome.clone(),
        });
        outcome
    }

    /// Last cached outcome without probing
    pub async fn peek(&self) -> Option<ProbeOutcome> {
        self.slot.lock().await.as_ref().map(|c| c.outcome.clone())
    }

    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
        info!("Connection cache cleared");
    }
}

// =============================================================================
// Standard Prober
// =============================================================================

/// Checks credentials, the control-plane API and the remote tool, in that order
pub struct StandardProber {
    settings: ProxmoxSettings,
    control_plane: Arc<dyn ControlPlane>,
    connector: Arc<dyn SessionConnector>,
    required_tool: String,
}

impl StandardProber {
    pub fn new(
        settings: ProxmoxSettings,
        control_plane: Arc<dyn ControlPlane>,
        connector: Arc<dyn SessionConnector>,
        required_tool: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            control_plane,
            connector,
            required_tool: required_tool.into(),
        }
    }

    async fn remote_tool_available(&self) -> Result<bool, String> {
        let session = self.connector.connect().await.map_err(|e| e.to_string())?;

        let command = format!("command -v {}", sh_escape(&self.required_tool));
        let result = async {
            let mut channel = session.open_command(&command).await?;
            let mut exit = None;
            while let Some(output) = channel.next_output().await? {
                if let CommandOutput::Exit(code) = output {
                    exit = Some(code);
                }
            }
            Ok::<_, crate::remote::SessionError>(exit == Some(0))
        }
        .await;

        if let Err(e) = session.close().await {
            debug!("Closing probe session failed: {}", e);
        }

        result.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl Prober for StandardProber {
    async fn probe(&self) -> ProbeOutcome {
        let missing = self.settings.missing();
        if !missing.is_empty() {
            return ProbeOutcome::failure(format!(
                "Proxmox configuration incomplete. Missing: {}",
                missing.join(", ")
            ));
        }

        let version = match self.control_plane.version().await {
            Ok(version) => version,
            Err(e) => return ProbeOutcome::failure(format!("Proxmox API unreachable: {}", e)),
        };

        match self.remote_tool_available().await {
            Ok(true) => ProbeOutcome::success(format!(
                "Connected to Proxmox VE {} on {}",
                version, self.settings.host
            )),
            Ok(false) => ProbeOutcome {
                remote_tool_available: false,
                ..ProbeOutcome::success(format!(
                    "Connected to Proxmox VE {}, but '{}' was not found on the remote host",
                    version, self.required_tool
                ))
            },
            Err(e) => ProbeOutcome {
                remote_tool_available: false,
                ..ProbeOutcome::success(format!(
                    "Connected to Proxmox VE {}, but the SSH check failed: {}",
                    version, e
                ))
            },
        }
    }
}
