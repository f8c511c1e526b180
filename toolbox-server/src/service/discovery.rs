//! Scrape task discovery from a table-of-contents page

use std::sync::Arc;
use thiserror::Error;
use toolbox_core::domain::scrape::ScrapeTask;
use tracing::info;

use super::fetch::{FetchError, PageFetcher};
use super::parse::extract_tasks;
use crate::config::ScraperSettings;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not fetch the table of contents from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("no command reference links were found on {0}; the page structure may have changed")]
    NoLinks(String),
}

pub struct TaskDiscovery {
    fetcher: Arc<dyn PageFetcher>,
    toc_url: String,
    base_url: String,
    categories: Vec<String>,
}

impl TaskDiscovery {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: &ScraperSettings) -> Self {
        Self {
            fetcher,
            toc_url: settings.toc_url.clone(),
            base_url: settings.base_url.clone(),
            categories: settings.categories.clone(),
        }
    }

    pub fn toc_url(&self) -> &str {
        &self.toc_url
    }

    pub async fn discover(&self) -> Result<Vec<ScrapeTask>, DiscoveryError> {
        let html = self
            .fetcher
            .fetch(&self.toc_url)
            .await
            .map_err(|source| DiscoveryError::Fetch {
                url: self.toc_url.clone(),
                source,
            })?;

        let tasks = extract_tasks(&html, &self.base_url, &self.categories);
        if tasks.is_empty() {
            return Err(DiscoveryError::NoLinks(self.toc_url.clone()));
        }

        info!("Discovered {} scrape task(s) from {}", tasks.len(), self.toc_url);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::FakeFetcher;

    fn discovery(fetcher: FakeFetcher) -> TaskDiscovery {
        let mut settings = Config::default().scraper;
        settings.toc_url = "https://docs.example.com/toc".to_string();
        settings.base_url = "https://docs.example.com/".to_string();
        TaskDiscovery::new(Arc::new(fetcher), &settings)
    }

    #[tokio::test]
    async fn test_discover_returns_matching_links() {
        let fetcher = FakeFetcher::new().page(
            "https://docs.example.com/toc",
            r#"<a href="/cli-reference/get">get</a><a href="/cli-reference/show">show</a>"#,
        );

        let tasks = discovery(fetcher).discover().await.unwrap();
        assert_eq!(
            tasks,
            vec![
                ScrapeTask::new("get", "https://docs.example.com/cli-reference/get"),
                ScrapeTask::new("show", "https://docs.example.com/cli-reference/show"),
            ]
        );
    }

    #[tokio::test]
    async fn test_discover_without_links_fails() {
        let fetcher = FakeFetcher::new().page("https://docs.example.com/toc", "<p>moved</p>");

        let err = discovery(fetcher).discover().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoLinks(_)));
    }

    #[tokio::test]
    async fn test_discover_fetch_failure() {
        let fetcher = FakeFetcher::new().failing("https://docs.example.com/toc", 503);

        let err = discovery(fetcher).discover().await.unwrap_err();
        assert!(err.to_string().contains("HTTP status 503"));
    }
}
