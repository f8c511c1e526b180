//! Toolbox Console Client
//!
//! A typed HTTP client for the toolbox console API: connection status,
//! VM import, documentation scraping and job progress streams.
//!
//! # Example
//!
//! ```no_run
//! use toolbox_client::ConsoleClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ConsoleClient::new("http://localhost:5001");
//!
//!     let started = client.start_scrape(Vec::new()).await?;
//!     let last = client
//!         .follow_progress(started.job_id, |event| println!("{}", event.message))
//!         .await?;
//!
//!     println!("Job ended with {:?}", last.map(|e| e.status));
//!     Ok(())
//! }
//! ```

pub mod error;
mod connection;
mod import;
mod progress;
mod scrape;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use progress::{SseFrame, SseParser};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the toolbox console API
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    /// Base URL of the console (e.g., "http://localhost:5001")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ConsoleClient {
    /// Create a new console client
    ///
    /// # Example
    /// ```
    /// use toolbox_client::ConsoleClient;
    ///
    /// let client = ConsoleClient::new("http://localhost:5001");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new console client with a custom HTTP client
    ///
    /// Progress streams stay open for as long as a job runs, so a client used
    /// with [`ConsoleClient::follow_progress`] should not set a total timeout.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the console
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET /health
    pub async fn health(&self) -> Result<String> {
        let response = self.client.get(self.url("/health")).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response.text().await?)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await?;
        Ok(())
    }
}
