//! The background worker that drains the job queue.
//!
//! # Loop
//!
//! ```text
//! mark Running
//! loop:
//!   cancel requested? ─► Cancelled
//!   peek chunk ── empty ─► Completed
//!   for each entry:
//!     scan + cache, remove from queue, advance progress   (one blocking unit)
//!     cancel requested? ─► Cancelled
//!   sleep(chunk delay) or token cancelled
//! clean up, record the exit as the worker status
//! ```
//!
//! A unit is never interrupted: cancellation is checked only between units
//! and between chunks. Each unit persists its queue removal and progress
//! before the next one starts.

use std::sync::Arc;
use std::time::Duration;

use mu_core::{JobState, ResourceId};
use mu_scanner::UsageService;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::control::{JobControl, WorkerStatus};
use crate::error::JobError;
use crate::events::JobEvent;
use crate::progress::ProgressTracker;
use crate::queue::JobQueue;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The queue drained.
    Completed,
    /// A cancel request was observed.
    Cancelled,
}

/// Persisted collaborators shared by the manager and the worker.
#[derive(Debug, Clone)]
pub(crate) struct JobStores {
    pub(crate) queue: JobQueue,
    pub(crate) progress: ProgressTracker,
    pub(crate) control: JobControl,
}

/// Drains the queue in chunks until it is empty or cancelled.
pub(crate) struct Worker {
    service: Arc<UsageService>,
    stores: JobStores,
    chunk_size: usize,
    chunk_delay: Duration,
    events: broadcast::Sender<JobEvent>,
    token: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        service: Arc<UsageService>,
        stores: JobStores,
        chunk_size: usize,
        chunk_delay: Duration,
        events: broadcast::Sender<JobEvent>,
        token: CancellationToken,
    ) -> Self {
        Self {
            service,
            stores,
            chunk_size: chunk_size.max(1),
            chunk_delay,
            events,
            token,
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn should_stop(&self) -> Result<bool, JobError> {
        Ok(self.token.is_cancelled() || self.stores.control.cancel_requested()?)
    }

    /// Runs the worker to completion.
    ///
    /// On error, including one while cleaning up, the worker marks itself
    /// stopped and leaves the queue and job state in place, so a later
    /// resume continues where it left off.
    #[instrument(skip_all, name = "worker")]
    pub(crate) async fn run(self) -> Result<WorkerExit, JobError> {
        let outcome = self
            .drain()
            .await
            .and_then(|exit| self.finish(exit).map(|()| exit));
        if let Err(err) = &outcome {
            error!(error = %err, "worker stopped on error");
            if let Err(status_err) = self.stores.control.set_worker_status(WorkerStatus::Stopped) {
                error!(error = %status_err, "failed to record worker stop");
            }
            self.emit(JobEvent::Failed {
                error: err.to_string(),
            });
        }
        outcome
    }

    async fn drain(&self) -> Result<WorkerExit, JobError> {
        self.stores.control.set_worker_status(WorkerStatus::Running)?;
        let queued = self.stores.queue.len()?;
        info!(queued, "worker started");
        self.emit(JobEvent::WorkerStarted { queued });

        loop {
            if self.should_stop()? {
                return Ok(WorkerExit::Cancelled);
            }

            let chunk = self.stores.queue.peek_chunk(self.chunk_size)?;
            if chunk.is_empty() {
                return Ok(WorkerExit::Completed);
            }
            debug!(size = chunk.len(), "processing chunk");

            for entry in chunk {
                self.process(entry.resource_id).await?;
                if self.should_stop()? {
                    return Ok(WorkerExit::Cancelled);
                }
            }

            tokio::select! {
                () = self.token.cancelled() => {}
                () = sleep(self.chunk_delay) => {}
            }
        }
    }

    async fn process(&self, id: ResourceId) -> Result<(), JobError> {
        let service = Arc::clone(&self.service);
        let stores = self.stores.clone();

        let (references, progress) = tokio::task::spawn_blocking(move || {
            let outcome = service.scan(id)?;
            stores.queue.complete(id)?;
            let progress = stores.progress.advance()?;
            Ok::<_, JobError>((outcome.references.len(), progress))
        })
        .await??;

        debug!(resource = %id, references, processed = progress.processed, "unit processed");
        self.emit(JobEvent::UnitProcessed {
            resource_id: id,
            references,
            progress,
        });
        Ok(())
    }

    fn finish(&self, exit: WorkerExit) -> Result<(), JobError> {
        let control = &self.stores.control;
        let progress = self.stores.progress.snapshot()?;
        self.stores.queue.clear()?;

        match exit {
            WorkerExit::Completed => {
                control.set_state(JobState::Completed)?;
                info!(processed = progress.processed, total = progress.total, "job completed");
                self.emit(JobEvent::Completed { progress });
            }
            WorkerExit::Cancelled => {
                control.clear_cancel()?;
                control.set_state(JobState::Cancelled)?;
                info!(processed = progress.processed, pending = progress.pending, "job cancelled");
                self.emit(JobEvent::Cancelled { progress });
            }
        }

        control.set_worker_status(exit.into())?;
        Ok(())
    }
}
