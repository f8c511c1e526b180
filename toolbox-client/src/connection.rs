//! Connection status endpoints

use toolbox_core::dto::connection::ConnectionStatus;

use crate::ConsoleClient;
use crate::error::Result;

impl ConsoleClient {
    /// Cached connectivity probe outcome; the server probes again if it is stale
    pub async fn connection_status(&self) -> Result<ConnectionStatus> {
        let response = self.client.get(self.url("/api/connection")).send().await?;

        self.handle_response(response).await
    }

    /// Last probe outcome without triggering a probe; 404 if none has completed
    pub async fn cached_connection_status(&self) -> Result<ConnectionStatus> {
        let response = self
            .client
            .get(self.url("/api/connection"))
            .query(&[("cached", "true")])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Forces the next status request to run a live probe
    pub async fn invalidate_connection(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/connection/invalidate"))
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}
