//! Connection status DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the last control-plane connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub ok: bool,
    pub message: String,
    pub remote_tool_available: bool,
    pub checked_at: DateTime<Utc>,
}
