//! Job launcher
//!
//! Allocates a job id, spawns the job body and returns immediately. Every job
//! body runs under a supervisor task that turns a panic into a generic `error`
//! event and tears down the job's registry entries once the body is done.

use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use toolbox_core::domain::import::ImportPlan;
use toolbox_core::domain::job::{JobId, JobKind};
use toolbox_core::domain::scrape::ScrapeTask;
use tracing::{error, info};

use super::artifacts::UploadedArchive;
use super::discovery::TaskDiscovery;
use super::import::ImportWorkflow;
use super::registry::JobRegistry;
use super::reporter::ProgressReporter;
use super::scrape::ScrapePool;

pub struct JobLauncher {
    registry: Arc<JobRegistry>,
    import: Arc<ImportWorkflow>,
    scrape: Arc<ScrapePool>,
    discovery: Arc<TaskDiscovery>,
}

impl JobLauncher {
    pub fn new(
        registry: Arc<JobRegistry>,
        import: Arc<ImportWorkflow>,
        scrape: Arc<ScrapePool>,
        discovery: Arc<TaskDiscovery>,
    ) -> Self {
        Self {
            registry,
            import,
            scrape,
            discovery,
        }
    }

    pub fn start_import(&self, plan: ImportPlan, archive: UploadedArchive) -> JobId {
        let job_id = self.registry.allocate(JobKind::Import);
        let reporter = self.registry.reporter(job_id);
        info!(
            "Starting import job {} for upload {} (VM {})",
            job_id, archive.id, plan.vm_id
        );

        let workflow = Arc::clone(&self.import);
        let job_reporter = reporter.clone();
        self.spawn_supervised(reporter, async move {
            workflow.run(plan, archive, job_reporter).await;
        });

        job_id
    }

    /// Starts a scrape; an empty task list is filled from the table of contents
    pub fn start_scrape(&self, tasks: Vec<ScrapeTask>) -> JobId {
        let job_id = self.registry.allocate(JobKind::Scrape);
        let cancel = self.registry.register_cancellation(job_id);
        let reporter = self.registry.reporter(job_id);
        info!("Starting scrape job {} with {} task(s)", job_id, tasks.len());

        let pool = Arc::clone(&self.scrape);
        let discovery = Arc::clone(&self.discovery);
        let job_reporter = reporter.clone();
        self.spawn_supervised(reporter, async move {
            let tasks = if tasks.is_empty() {
                job_reporter.info(format!(
                    "No pages given, reading the table of contents at {}",
                    discovery.toc_url()
                ));
                match discovery.discover().await {
                    Ok(found) => {
                        job_reporter.info(format!("{} command categories found", found.len()));
                        found
                    }
                    Err(e) => {
                        job_reporter.fail(e.to_string());
                        return;
                    }
                }
            } else {
                tasks
            };

            pool.run(tasks, cancel, job_reporter).await;
        });

        job_id
    }

    /// Requests cancellation of a running scrape; false if there is none
    pub fn stop_scrape(&self, job_id: JobId) -> bool {
        let stopped = self.registry.cancel(job_id);
        if stopped {
            info!("Cancellation requested for scrape job {}", job_id);
        }
        stopped
    }

    fn spawn_supervised<F>(&self, reporter: ProgressReporter, job: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            let job_id = reporter.job_id();

            if let Err(e) = tokio::spawn(job).await {
                error!("Job {} aborted unexpectedly: {}", job_id, e);
                reporter.fail("A critical unexpected error occurred while running the job");
            }

            registry.unregister_cancellation(job_id);
            registry.release(job_id);
        })
    }
}
