//! SSH transport
//!
//! [`RemoteSession`] over russh: password or private-key authentication,
//! exec channels for commands and a lazily opened SFTP subsystem for uploads.

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use russh_sftp::client::SftpSession;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{CommandChannel, CommandOutput, RemoteSession, SessionConnector, SessionError};
use crate::config::{SshAuth, SshSettings};

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Extended data stream id carrying stderr
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Opens SSH sessions with the configured credentials
pub struct SshConnector {
    settings: SshSettings,
}

impl SshConnector {
    pub fn new(settings: SshSettings) -> Self {
        Self { settings }
    }

    fn connect_error(&self, reason: impl ToString) -> SessionError {
        SessionError::Connect {
            host: self.settings.host.clone(),
            port: self.settings.port,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl SessionConnector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, SessionError> {
        let settings = &self.settings;

        if settings.host.is_empty() {
            return Err(self.connect_error("SSH host is not configured"));
        }

        info!(
            "Opening SSH session to {}@{}:{}",
            settings.username, settings.host, settings.port
        );

        let config = Arc::new(client::Config::default());
        let handler = HostKeyLogger {
            host: settings.host.clone(),
        };

        let mut handle = tokio::time::timeout(
            settings.connect_timeout,
            client::connect(config, (settings.host.as_str(), settings.port), handler),
        )
        .await
        .map_err(|_| SessionError::Timeout(format!("{}:{}", settings.host, settings.port)))?
        .map_err(|e| self.connect_error(e))?;

        let authenticated = match &settings.auth {
            SshAuth::Password(password) => handle
                .authenticate_password(&settings.username, password)
                .await
                .map_err(|e| self.connect_error(e))?,
            SshAuth::Key { path, passphrase } => {
                // Format is detected from the PEM contents (RSA, Ed25519, ECDSA)
                let key_pair =
                    russh_keys::load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                        SessionError::Key {
                            path: path.display().to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                handle
                    .authenticate_publickey(&settings.username, Arc::new(key_pair))
                    .await
                    .map_err(|e| self.connect_error(e))?
            }
        };

        if !authenticated {
            return Err(SessionError::AuthenticationFailed(settings.username.clone()));
        }

        debug!("SSH session to {} authenticated", settings.host);

        Ok(Box::new(SshSession {
            handle,
            sftp: Mutex::new(None),
            target: settings.host.clone(),
        }))
    }
}

/// Accepts any host key and logs its fingerprint
struct HostKeyLogger {
    host: String,
}

#[async_trait]
impl client::Handler for HostKeyLogger {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Accepting host key for {}: {}",
            self.host,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}

struct SshSession {
    handle: Handle<HostKeyLogger>,
    sftp: Mutex<Option<Arc<SftpSession>>>,
    target: String,
}

impl SshSession {
    async fn sftp(&self) -> Result<Arc<SftpSession>, SessionError> {
        let mut slot = self.sftp.lock().await;
        if let Some(sftp) = slot.as_ref() {
            return Ok(Arc::clone(sftp));
        }

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SessionError::Sftp(e.to_string()))?;

        debug!("SFTP subsystem opened on {}", self.target);

        let sftp = Arc::new(sftp);
        *slot = Some(Arc::clone(&sftp));
        Ok(sftp)
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn open_command(&self, command: &str) -> Result<Box<dyn CommandChannel>, SessionError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;

        Ok(Box::new(SshCommand { channel }))
    }

    async fn create_dir(&self, path: &str) -> Result<(), SessionError> {
        let sftp = self.sftp().await?;

        let exists = sftp
            .try_exists(path)
            .await
            .map_err(|e| SessionError::Sftp(format!("cannot stat {}: {}", path, e)))?;

        if !exists {
            sftp.create_dir(path)
                .await
                .map_err(|e| SessionError::Sftp(format!("cannot create {}: {}", path, e)))?;
        }

        Ok(())
    }

    async fn upload(
        &self,
        local: &Path,
        remote: &str,
        on_progress: &mut (dyn FnMut(u64, u64) + Send),
    ) -> Result<(), SessionError> {
        let sftp = self.sftp().await?;

        let mut source = tokio::fs::File::open(local).await?;
        let total = source.metadata().await?.len();

        let mut target = sftp
            .create(remote)
            .await
            .map_err(|e| SessionError::Sftp(format!("cannot create {}: {}", remote, e)))?;

        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut sent = 0u64;
        on_progress(sent, total);

        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            target
                .write_all(&buffer[..read])
                .await
                .map_err(|e| SessionError::Sftp(format!("write to {} failed: {}", remote, e)))?;
            sent += read as u64;
            on_progress(sent, total);
        }

        target
            .shutdown()
            .await
            .map_err(|e| SessionError::Sftp(format!("closing {} failed: {}", remote, e)))?;

        Ok(())
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.sftp.lock().await.take();

        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| SessionError::Channel(e.to_string()))?;

        info!("SSH session to {} closed", self.target);
        Ok(())
    }
}

struct SshCommand {
    channel: Channel<Msg>,
}

#[async_trait]
impl CommandChannel for SshCommand {
    async fn next_output(&mut self) -> Result<Option<CommandOutput>, SessionError> {
        loop {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    return Ok(Some(CommandOutput::Stdout(data.to_vec())));
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    let bytes = data.to_vec();
                    return Ok(Some(if ext == SSH_EXTENDED_DATA_STDERR {
                        CommandOutput::Stderr(bytes)
                    } else {
                        CommandOutput::Stdout(bytes)
                    }));
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return Ok(Some(CommandOutput::Exit(exit_status)));
                }
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }
}
