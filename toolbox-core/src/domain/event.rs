//! Progress event types
//!
//! A job publishes an ordered stream of [`ProgressEvent`]s. Exactly one of them
//! carries a terminal status (`error`, `cancelled` or `finished`) and ends the stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status tag attached to every progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Info,
    Warning,
    Error,
    Cancelled,
    Finished,
}

impl EventStatus {
    /// Terminal statuses end a job's event stream
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStatus::Error | EventStatus::Cancelled | EventStatus::Finished
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Info => "info",
            EventStatus::Warning => "warning",
            EventStatus::Error => "error",
            EventStatus::Cancelled => "cancelled",
            EventStatus::Finished => "finished",
        }
    }
}

/// Numeric progress as `completed` out of `total`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// One ordered message delivered to a job's observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

impl ProgressEvent {
    pub fn new(status: EventStatus, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            status,
            message: message.into(),
            progress: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventStatus::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(EventStatus::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventStatus::Error, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(EventStatus::Cancelled, message)
    }

    pub fn finished(message: impl Into<String>) -> Self {
        Self::new(EventStatus::Finished, message)
    }

    /// Attaches a `completed/total` counter to the event
    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        self.progress = Some(Progress { completed, total });
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
