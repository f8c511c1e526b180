//! Remote session transport
//!
//! Traits describing an authenticated connection to the hypervisor host:
//! command channels that yield stdout/stderr data and an exit status, SFTP
//! uploads with byte-count progress, and an explicit close.

pub mod ssh;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use ssh::SshConnector;

/// Errors raised by the remote transport
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("connection to {0} timed out")]
    Timeout(String),

    #[error("authentication failed for user '{0}'")]
    AuthenticationFailed(String),

    #[error("failed to load private key '{path}': {reason}")]
    Key { path: String, reason: String },

    #[error("channel error: {0}")]
    Channel(String),

    #[error("file transfer error: {0}")]
    Sftp(String),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One chunk of output from a running remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(u32),
}

/// A command running on the remote host
#[async_trait]
pub trait CommandChannel: Send {
    /// Next chunk of output, or `None` once the channel has closed
    async fn next_output(&mut self) -> Result<Option<CommandOutput>, SessionError>;
}

/// An open, authenticated session to one host
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Starts `command` on a fresh channel
    async fn open_command(&self, command: &str) -> Result<Box<dyn CommandChannel>, SessionError>;

    /// Creates `path` on the remote host if it does not exist
    async fn create_dir(&self, path: &str) -> Result<(), SessionError>;

    /// Copies a local file to `remote`, reporting `(sent, total)` bytes as it goes
    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<(), SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens remote sessions with the configured credentials
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SessionError>;
}

/// Quotes a value for a POSIX shell command line
pub fn sh_escape(value: &str) -> String {
    if !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./:=@%+,".contains(&b))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}
