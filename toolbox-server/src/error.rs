//! Job error taxonomy
//!
//! Every failure that can end a background job. Each variant is converted into
//! exactly one `error` progress event by the workflow that owns it.

use thiserror::Error;

use crate::proxmox::ControlPlaneError;
use crate::remote::SessionError;
use crate::service::sink::PersistError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Control plane unreachable or required remote tooling missing
    #[error("environment check failed: {0}")]
    Environment(String),

    /// Transport or authentication failure on the remote session
    #[error("{0}")]
    Connection(#[source] SessionError),

    /// The control plane rejected a create or update call
    #[error("{0}")]
    Provision(#[source] ControlPlaneError),

    #[error("failed to transfer '{file}': {source}")]
    Transfer {
        file: String,
        #[source]
        source: SessionError,
    },

    #[error("command '{command}' failed with exit code {}. Full output:\n{output}", describe_exit(.exit_status))]
    RemoteCommandFailed {
        command: String,
        exit_status: Option<u32>,
        output: String,
    },

    /// The import command succeeded but its output had no volume id
    #[error("could not find the imported volume id for '{file}'. Output:\n{output}")]
    Import { file: String, output: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Missing or unreadable local files
    #[error("{0}")]
    Artifact(String),
}

impl JobError {
    /// Message published as the job's terminal `error` event
    pub fn user_message(&self) -> String {
        match self {
            JobError::Connection(_) => format!("An SSH connection error occurred: {}", self),
            JobError::Provision(_) => format!("A control-plane API error occurred: {}", self),
            JobError::Persist(_) => format!("Failed to save results: {}", self),
            _ => format!("A configuration or file error occurred: {}", self),
        }
    }
}

fn describe_exit(status: &Option<u32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "unknown".to_string(),
    }
}
