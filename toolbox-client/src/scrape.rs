//! Documentation scrape endpoints

use toolbox_core::domain::job::JobId;
use toolbox_core::domain::scrape::ScrapeTask;
use toolbox_core::dto::job::JobStarted;
use toolbox_core::dto::scrape::{CommandMatch, StartScrapeRequest, StopScrapeResponse};

use crate::ConsoleClient;
use crate::error::Result;

impl ConsoleClient {
    /// Starts a scrape job; an empty list lets the server discover the pages
    pub async fn start_scrape(&self, tasks: Vec<ScrapeTask>) -> Result<JobStarted> {
        let response = self
            .client
            .post(self.url("/api/scrape/start"))
            .json(&StartScrapeRequest { tasks })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Requests cancellation of a running scrape
    pub async fn stop_scrape(&self, id: JobId) -> Result<StopScrapeResponse> {
        let response = self
            .client
            .post(self.url(&format!("/api/scrape/{}/stop", id)))
            .send()
            .await?;

        self.handle_response(response).await
    }

    pub async fn search_commands(&self, query: &str) -> Result<Vec<CommandMatch>> {
        let response = self
            .client
            .get(self.url("/api/commands"))
            .query(&[("q", query)])
            .send()
            .await?;

        self.handle_response(response).await
    }
}
