//! Job registry
//!
//! Process-wide bookkeeping for running jobs: one FIFO progress channel per
//! job id, and the cancellation tokens of jobs that can be stopped.
//!
//! Lifecycle of a channel:
//! - `create`/`allocate` registers it when a job is triggered
//! - the job publishes events through a [`ProgressReporter`]
//! - one consumer claims the receiving side with `drain`; dropping the
//!   [`ProgressDrain`] removes the entry
//! - `release` is called by the job when it is done. If nobody has claimed the
//!   channel yet, the entry stays so a late consumer can still read the backlog.
//!   A channel that is never drained is kept until the process exits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use toolbox_core::domain::event::ProgressEvent;
use toolbox_core::domain::job::{JobId, JobKind};
use tracing::debug;
use uuid::Uuid;

use super::reporter::ProgressReporter;

struct ChannelEntry {
    kind: JobKind,
    tx: UnboundedSender<ProgressEvent>,
    /// Taken by the first consumer
    rx: Option<UnboundedReceiver<ProgressEvent>>,
}

/// Registry of progress channels and cancellation tokens
pub struct JobRegistry {
    channels: Mutex<HashMap<JobId, ChannelEntry>>,
    cancellations: Mutex<HashMap<JobId, CancellationToken>>,
    idle_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl JobRegistry {
    /// Creates a registry whose consumers give up after `idle_timeout` without events
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            cancellations: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Registers a channel for `job_id`; returns false if one already exists
    pub fn create(&self, job_id: JobId, kind: JobKind) -> bool {
        let mut channels = lock(&self.channels);
        if channels.contains_key(&job_id) {
            return false;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        channels.insert(
            job_id,
            ChannelEntry {
                kind,
                tx,
                rx: Some(rx),
            },
        );
        debug!("Registered {} job {}", kind, job_id);
        true
    }

    /// Registers a channel under a fresh id
    pub fn allocate(&self, kind: JobKind) -> JobId {
        loop {
            let job_id = Uuid::new_v4();
            if self.create(job_id, kind) {
                return job_id;
            }
        }
    }

    /// Appends an event to the job's channel; no-op if the job is gone
    pub fn publish(&self, job_id: JobId, event: ProgressEvent) -> bool {
        let channels = lock(&self.channels);
        match channels.get(&job_id) {
            Some(entry) => entry.tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Claims the receiving side of the job's channel
    ///
    /// Returns `None` if the job is unknown or another consumer already holds it.
    pub fn drain(self: &Arc<Self>, job_id: JobId) -> Option<ProgressDrain> {
        let (kind, rx) = {
            let mut channels = lock(&self.channels);
            let entry = channels.get_mut(&job_id)?;
            (entry.kind, entry.rx.take()?)
        };

        debug!("Progress consumer attached to {} job {}", kind, job_id);

        Some(ProgressDrain {
            job_id,
            kind,
            rx,
            idle_timeout: self.idle_timeout,
            registry: Arc::clone(self),
            done: false,
        })
    }

    /// Deletes the job's channel; idempotent
    pub fn remove(&self, job_id: JobId) -> bool {
        let removed = lock(&self.channels).remove(&job_id).is_some();
        if removed {
            debug!("Removed progress channel for job {}", job_id);
        }
        removed
    }

    /// Producer-side teardown once a job has published its terminal event
    pub fn release(&self, job_id: JobId) {
        let mut channels = lock(&self.channels);
        let claimed = channels.get(&job_id).is_some_and(|entry| entry.rx.is_none());
        if claimed {
            channels.remove(&job_id);
            debug!("Released progress channel for job {}", job_id);
        }
    }

    #[cfg(test)]
    pub fn contains(&self, job_id: JobId) -> bool {
        lock(&self.channels).contains_key(&job_id)
    }

    /// Publishing handle for a job
    pub fn reporter(self: &Arc<Self>, job_id: JobId) -> ProgressReporter {
        ProgressReporter::new(job_id, Arc::clone(self))
    }

    // =============================================================================
    // Cancellation
    // =============================================================================

    /// Registers a cancellation token for a running job
    pub fn register_cancellation(&self, job_id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        lock(&self.cancellations).insert(job_id, token.clone());
        token
    }

    /// Cancels a running job; false if no such job is running
    pub fn cancel(&self, job_id: JobId) -> bool {
        match lock(&self.cancellations).get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn unregister_cancellation(&self, job_id: JobId) {
        lock(&self.cancellations).remove(&job_id);
    }
}

/// Consumer side of one job's progress channel
///
/// Yields events in publish order and stops after a terminal event, when the
/// producer is gone, or when no event arrives within the idle timeout.
/// Dropping it removes the job's channel from the registry.
pub struct ProgressDrain {
    job_id: JobId,
    kind: JobKind,
    rx: UnboundedReceiver<ProgressEvent>,
    idle_timeout: Duration,
    registry: Arc<JobRegistry>,
    done: bool,
}

impl ProgressDrain {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }

        match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
            Ok(Some(event)) => {
                if event.is_terminal() {
                    self.done = true;
                }
                Some(event)
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(_) => {
                debug!(
                    "No progress for job {} within {:?}, closing stream",
                    self.job_id, self.idle_timeout
                );
                self.done = true;
                None
            }
        }
    }
}

impl Drop for ProgressDrain {
    fn drop(&mut self) {
        self.registry.remove(self.job_id);
    }
}
