//! Server configuration
//!
//! Connection settings for the control plane and the remote host, scraper
//! targets, and the timeouts that govern job progress streaming.

use std::path::PathBuf;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Directory holding uploaded archives and their extracted files
    pub upload_dir: PathBuf,

    /// Base directory on the remote host for per-job temporary directories
    pub remote_temp_base: String,

    /// How long a progress stream waits for the next event before giving up
    pub progress_idle_timeout: Duration,

    /// How long a connectivity probe result stays fresh
    pub probe_ttl: Duration,

    pub proxmox: ProxmoxSettings,
    pub ssh: SshSettings,
    pub scraper: ScraperSettings,
}

/// Proxmox VE API token credentials
#[derive(Debug, Clone)]
pub struct ProxmoxSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub token_name: String,
    pub token_value: String,
    pub verify_ssl: bool,
}

impl ProxmoxSettings {
    /// Names of required settings that are not set
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("PROXMOX_HOST", &self.host),
            ("PROXMOX_USER", &self.user),
            ("PROXMOX_TOKEN_NAME", &self.token_name),
            ("PROXMOX_TOKEN_VALUE", &self.token_value),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect()
    }

    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }
}

/// How the SSH session authenticates
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(String),
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

/// SSH connection settings for the hypervisor host
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub connect_timeout: Duration,
}

/// Scraper targets and pool sizing
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub base_url: String,
    pub toc_url: String,
    pub output_path: PathBuf,
    pub workers: usize,
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Link texts selected from the table of contents
    pub categories: Vec<String>,
}

impl Config {
    /// Creates a configuration with defaults and no credentials
    pub fn new(bind_addr: String) -> Self {
        Self {
            bind_addr,
            upload_dir: PathBuf::from("./temp_uploads"),
            remote_temp_base: "/tmp".to_string(),
            progress_idle_timeout: Duration::from_secs(60),
            probe_ttl: Duration::from_secs(300),
            proxmox: ProxmoxSettings {
                host: String::new(),
                port: 8006,
                user: String::new(),
                token_name: String::new(),
                token_value: String::new(),
                verify_ssl: true,
            },
            ssh: SshSettings {
                host: String::new(),
                port: 22,
                username: "root".to_string(),
                auth: SshAuth::Password(String::new()),
                connect_timeout: Duration::from_secs(10),
            },
            scraper: ScraperSettings {
                base_url: String::new(),
                toc_url: String::new(),
                output_path: PathBuf::from("./data/commands.json"),
                workers: 10,
                request_timeout: Duration::from_secs(30),
                user_agent: default_user_agent(),
                categories: default_categories(),
            },
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - TOOLBOX_BIND_ADDR (default: 0.0.0.0:5001)
    /// - TOOLBOX_UPLOAD_DIR (default: ./temp_uploads)
    /// - REMOTE_TEMP_DIR (default: /tmp)
    /// - PROGRESS_IDLE_TIMEOUT (seconds, default: 60)
    /// - PROBE_TTL (seconds, default: 300)
    /// - PROXMOX_HOST, PROXMOX_PORT (8006), PROXMOX_USER, PROXMOX_TOKEN_NAME,
    ///   PROXMOX_TOKEN_VALUE, PROXMOX_VERIFY_SSL (true)
    /// - SSH_HOST (default: PROXMOX_HOST), SSH_PORT (22), SSH_USERNAME (root),
    ///   SSH_AUTH_METHOD (password|key), SSH_PASSWORD, SSH_PRIVATE_KEY_PATH,
    ///   SSH_PRIVATE_KEY_PASSWORD
    /// - SCRAPER_BASE_URL, SCRAPER_TOC_URL, SCRAPER_OUTPUT_PATH,
    ///   SCRAPER_WORKERS (10), SCRAPER_TIMEOUT (seconds, 30)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let text = |key: &str| get(key).unwrap_or_default();
        let seconds = |key: &str, default: u64| {
            get(key)
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(default))
        };

        let mut config = Self::new(get("TOOLBOX_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5001".to_string()));

        if let Some(dir) = get("TOOLBOX_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get("REMOTE_TEMP_DIR") {
            config.remote_temp_base = dir;
        }
        config.progress_idle_timeout = seconds("PROGRESS_IDLE_TIMEOUT", 60);
        config.probe_ttl = seconds("PROBE_TTL", 300);

        config.proxmox = ProxmoxSettings {
            host: text("PROXMOX_HOST"),
            port: get("PROXMOX_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(8006),
            user: text("PROXMOX_USER"),
            token_name: text("PROXMOX_TOKEN_NAME"),
            token_value: text("PROXMOX_TOKEN_VALUE"),
            verify_ssl: get("PROXMOX_VERIFY_SSL")
                .map(|s| parse_bool(&s))
                .unwrap_or(true),
        };

        let auth = match get("SSH_AUTH_METHOD").as_deref().unwrap_or("password") {
            "password" => SshAuth::Password(text("SSH_PASSWORD")),
            "key" => SshAuth::Key {
                path: PathBuf::from(text("SSH_PRIVATE_KEY_PATH")),
                passphrase: get("SSH_PRIVATE_KEY_PASSWORD").filter(|p| !p.is_empty()),
            },
            other => anyhow::bail!("SSH_AUTH_METHOD must be 'password' or 'key' (got '{}')", other),
        };

        config.ssh = SshSettings {
            host: get("SSH_HOST")
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| config.proxmox.host.clone()),
            port: get("SSH_PORT").and_then(|s| s.parse().ok()).unwrap_or(22),
            username: get("SSH_USERNAME")
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| "root".to_string()),
            auth,
            connect_timeout: Duration::from_secs(10),
        };

        config.scraper.base_url = text("SCRAPER_BASE_URL");
        config.scraper.toc_url = text("SCRAPER_TOC_URL");
        if let Some(path) = get("SCRAPER_OUTPUT_PATH").filter(|p| !p.is_empty()) {
            config.scraper.output_path = PathBuf::from(path);
        }
        config.scraper.workers = get("SCRAPER_WORKERS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        config.scraper.request_timeout = seconds("SCRAPER_TIMEOUT", 30);

        Ok(config)
    }

    /// Validates the configuration
    ///
    /// Missing control-plane credentials are not an error here; the
    /// connectivity probe reports them instead.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.upload_dir.as_os_str().is_empty() {
            anyhow::bail!("upload_dir cannot be empty");
        }

        if self.remote_temp_base.is_empty() || !self.remote_temp_base.starts_with('/') {
            anyhow::bail!("remote_temp_base must be an absolute path");
        }

        if self.progress_idle_timeout.is_zero() {
            anyhow::bail!("progress_idle_timeout must be greater than 0");
        }

        if self.probe_ttl.is_zero() {
            anyhow::bail!("probe_ttl must be greater than 0");
        }

        if self.scraper.workers == 0 {
            anyhow::bail!("scraper workers must be greater than 0");
        }

        if self.scraper.request_timeout.is_zero() {
            anyhow::bail!("scraper request_timeout must be greater than 0");
        }

        if let SshAuth::Key { path, .. } = &self.ssh.auth {
            if path.as_os_str().is_empty() {
                anyhow::bail!("SSH_PRIVATE_KEY_PATH must be set when SSH_AUTH_METHOD is 'key'");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("0.0.0.0:5001".to_string())
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_user_agent() -> String {
    format!(
        "{}/{} (operator toolbox scraper)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

fn default_categories() -> Vec<String> {
    ["get", "diagnose", "execute", "config", "show"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.progress_idle_timeout, Duration::from_secs(60));
        assert_eq!(config.probe_ttl, Duration::from_secs(300));
        assert_eq!(config.scraper.workers, 10);
        assert_eq!(config.scraper.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.scraper.workers = 0;
        assert!(config.validate().is_err());
        config.scraper.workers = 4;

        config.remote_temp_base = "tmp".to_string();
        assert!(config.validate().is_err());
        config.remote_temp_base = "/var/tmp".to_string();

        config.ssh.auth = SshAuth::Key {
            path: PathBuf::new(),
            passphrase: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_reads_settings() {
        let config = Config::from_lookup(lookup(&[
            ("PROXMOX_HOST", "pve.lab"),
            ("PROXMOX_USER", "root@pam"),
            ("PROXMOX_TOKEN_NAME", "toolbox"),
            ("PROXMOX_TOKEN_VALUE", "secret"),
            ("PROXMOX_VERIFY_SSL", "false"),
            ("SSH_AUTH_METHOD", "key"),
            ("SSH_PRIVATE_KEY_PATH", "/keys/id_ed25519"),
            ("SCRAPER_WORKERS", "3"),
            ("PROBE_TTL", "120"),
        ]))
        .unwrap();

        assert_eq!(config.proxmox.base_url(), "https://pve.lab:8006/api2/json");
        assert!(!config.proxmox.verify_ssl);
        assert!(config.proxmox.missing().is_empty());
        assert_eq!(config.ssh.host, "pve.lab");
        assert_eq!(config.ssh.username, "root");
        assert!(matches!(
            config.ssh.auth,
            SshAuth::Key { ref path, passphrase: None } if path == &PathBuf::from("/keys/id_ed25519")
        ));
        assert_eq!(config.scraper.workers, 3);
        assert_eq!(config.probe_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_unknown_auth_method_rejected() {
        let result = Config::from_lookup(lookup(&[("SSH_AUTH_METHOD", "kerberos")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_proxmox_settings() {
        let config = Config::from_lookup(lookup(&[("PROXMOX_HOST", "pve.lab")])).unwrap();
        assert_eq!(
            config.proxmox.missing(),
            vec!["PROXMOX_USER", "PROXMOX_TOKEN_NAME", "PROXMOX_TOKEN_VALUE"]
        );
    }
}
