//! Scrape pool
//!
//! Fetches and parses a fixed list of pages with bounded concurrency. Each
//! attempted page advances a shared `completed/total` counter; the counter is
//! bumped and published under one lock so observers see it strictly increase.
//! Cancellation is cooperative: no new page starts once the token is set, and
//! results that arrive afterwards are thrown away.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use toolbox_core::domain::scrape::{ScrapeRecord, ScrapeTask};
use tracing::{debug, error};

use super::fetch::PageFetcher;
use super::parse::{extract_commands, extract_summary};
use super::reporter::ProgressReporter;
use super::sink::ResultSink;
use crate::error::JobError;

#[derive(Default)]
struct Tally {
    completed: usize,
    records: Vec<(usize, ScrapeRecord)>,
}

pub struct ScrapePool {
    fetcher: Arc<dyn PageFetcher>,
    sink: Arc<dyn ResultSink>,
    workers: usize,
}

impl ScrapePool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, sink: Arc<dyn ResultSink>, workers: usize) -> Self {
        Self {
            fetcher,
            sink,
            workers: workers.max(1),
        }
    }

    /// Scrapes every task and publishes exactly one terminal event
    pub async fn run(
        &self,
        tasks: Vec<ScrapeTask>,
        cancel: CancellationToken,
        reporter: ProgressReporter,
    ) {
        let total = tasks.len();
        reporter.info(format!(
            "Scraping {} page(s) with up to {} concurrent worker(s)",
            total, self.workers
        ));

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let tally = Arc::new(Mutex::new(Tally::default()));
        let mut set = JoinSet::new();

        for (index, task) in tasks.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let worker = Worker {
                fetcher: Arc::clone(&self.fetcher),
                cancel: cancel.clone(),
                tally: Arc::clone(&tally),
                reporter: reporter.clone(),
                total,
            };
            set.spawn(async move {
                worker.scrape(index, task).await;
                drop(permit);
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                error!("Scrape worker for job {} crashed: {}", reporter.job_id(), e);
            }
        }

        let Tally { completed, mut records } =
            std::mem::take(&mut *tally.lock().unwrap_or_else(PoisonError::into_inner));

        if cancel.is_cancelled() {
            reporter.cancel(format!(
                "Scrape cancelled after {} of {} page(s); no results were saved",
                completed, total
            ));
            return;
        }

        records.sort_by_key(|(index, _)| *index);
        let records: Vec<ScrapeRecord> = records.into_iter().map(|(_, record)| record).collect();

        match self.sink.persist(&records).await {
            Ok(location) => reporter.finish(format!(
                "Scrape completed: {} of {} page(s) saved to {}",
                records.len(),
                total,
                location
            )),
            Err(e) => reporter.fail(JobError::Persist(e).user_message()),
        };
    }
}

struct Worker {
    fetcher: Arc<dyn PageFetcher>,
    cancel: CancellationToken,
    tally: Arc<Mutex<Tally>>,
    reporter: ProgressReporter,
    total: usize,
}

impl Worker {
    async fn scrape(&self, index: usize, task: ScrapeTask) {
        if self.cancel.is_cancelled() {
            debug!("Skipping '{}': scrape cancelled", task.name);
            return;
        }

        debug!("Fetching '{}' from {}", task.name, task.url);
        let outcome = self.fetch_record(&task).await;

        if self.cancel.is_cancelled() {
            debug!("Discarding result for '{}': scrape cancelled", task.name);
            return;
        }

        let mut tally = self.tally.lock().unwrap_or_else(PoisonError::into_inner);
        tally.completed += 1;
        let completed = tally.completed;

        match outcome {
            Ok(record) => {
                let message = format!(
                    "Scraped '{}' ({} command(s))",
                    task.name,
                    record.commands.len()
                );
                tally.records.push((index, record));
                self.reporter.progress(message, completed, self.total);
            }
            Err(reason) => {
                self.reporter
                    .warn(format!("Failed to scrape '{}' ({}): {}", task.name, task.url, reason));
                self.reporter
                    .progress(format!("Skipped '{}'", task.name), completed, self.total);
            }
        }
    }

    async fn fetch_record(&self, task: &ScrapeTask) -> Result<ScrapeRecord, String> {
        let html = self.fetcher.fetch(&task.url).await.map_err(|e| e.to_string())?;

        let summary = extract_summary(&html)
            .ok_or_else(|| "no description metadata found on the page".to_string())?;

        Ok(ScrapeRecord {
            name: task.name.clone(),
            summary,
            url: task.url.clone(),
            commands: extract_commands(&html),
        })
    }
}
