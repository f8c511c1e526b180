//! Progress reporter
//!
//! Cloneable publishing handle for one job. Terminal events go through a
//! shared once-flag so a job can never report two outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use toolbox_core::domain::event::{EventStatus, ProgressEvent};
use toolbox_core::domain::job::JobId;
use tracing::{error, info, warn};

use super::registry::JobRegistry;

#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    registry: Arc<JobRegistry>,
    terminated: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn new(job_id: JobId, registry: Arc<JobRegistry>) -> Self {
        Self {
            job_id,
            registry,
            terminated: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(ProgressEvent::info(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.publish(ProgressEvent::warning(message));
    }

    /// Publishes an `info` event carrying a `completed/total` counter
    pub fn progress(&self, message: impl Into<String>, completed: usize, total: usize) {
        self.publish(ProgressEvent::info(message).with_progress(completed, total));
    }

    /// Publishes the `finished` event; false if the job already terminated
    pub fn finish(&self, message: impl Into<String>) -> bool {
        self.terminate(ProgressEvent::finished(message))
    }

    /// Publishes the `error` event; false if the job already terminated
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.terminate(ProgressEvent::error(message))
    }

    /// Publishes the `cancelled` event; false if the job already terminated
    pub fn cancel(&self, message: impl Into<String>) -> bool {
        self.terminate(ProgressEvent::cancelled(message))
    }

    #[cfg(test)]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn terminate(&self, event: ProgressEvent) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            warn!(
                "Job {} already reported its outcome, dropping {} event: {}",
                self.job_id,
                event.status.as_str(),
                event.message
            );
            return false;
        }
        self.publish(event);
        true
    }

    fn publish(&self, event: ProgressEvent) {
        match event.status {
            EventStatus::Info | EventStatus::Finished => {
                info!("[job {}] {}", self.job_id, event.message)
            }
            EventStatus::Warning | EventStatus::Cancelled => {
                warn!("[job {}] {}", self.job_id, event.message)
            }
            EventStatus::Error => error!("[job {}] {}", self.job_id, event.message),
        }
        self.registry.publish(self.job_id, event);
    }
}
