//! Scrape DTOs

use serde::{Deserialize, Serialize};

use crate::domain::scrape::{CommandEntry, ScrapeTask};

/// Request to start a scrape; an empty task list asks the server to discover tasks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartScrapeRequest {
    #[serde(default)]
    pub tasks: Vec<ScrapeTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopScrapeResponse {
    pub stopped: bool,
}

/// A command reference match from the last persisted scrape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandMatch {
    pub category: String,
    #[serde(flatten)]
    pub entry: CommandEntry,
}
