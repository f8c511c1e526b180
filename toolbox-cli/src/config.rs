//! Configuration module
//!
//! Handles CLI configuration such as the console URL.

use toolbox_client::ConsoleClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the toolbox console server
    pub console_url: String,
}

impl Config {
    /// Builds a client for the configured console
    pub fn client(&self) -> ConsoleClient {
        ConsoleClient::new(&self.console_url)
    }
}
