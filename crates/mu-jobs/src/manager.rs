//! The job coordinator exposed to the host.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use mu_core::{
    Config, ContentSources, EntityKey, JobConfig, JobQueueEntry, JobState, KeyValueStore,
    ProgressState, ResourceCatalog, ResourceId,
};
use mu_scanner::{BatchOutcome, MutationBatch, UsageReport, UsageService};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::control::{JobControl, JobKeys, WorkerStatus};
use crate::error::JobError;
use crate::events::{EVENT_CHANNEL_CAPACITY, JobEvent};
use crate::progress::{ProgressTracker, TimeUnit};
use crate::queue::JobQueue;
use crate::worker::{JobStores, Worker, WorkerExit};

/// Answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    /// Whether a new job was dispatched.
    pub started: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Entries enqueued by this request.
    pub enqueued: usize,
}

impl StartReport {
    fn not_started(message: &str) -> Self {
        Self {
            started: false,
            message: message.to_owned(),
            enqueued: 0,
        }
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReport {
    /// Whether this request stopped a job.
    pub cancelled: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl CancelReport {
    fn new(cancelled: bool, message: &str) -> Self {
        Self {
            cancelled,
            message: message.to_owned(),
        }
    }
}

/// Answer to a progress request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Resources scanned.
    pub processed: u64,
    /// Resources still queued.
    pub pending: u64,
    /// Resources in the job.
    pub total: u64,
    /// Estimated time to finish, in `time_unit`.
    pub estimated_time: f64,
    /// Unit of `estimated_time`.
    pub time_unit: TimeUnit,
}

struct WorkerSlot {
    handle: JoinHandle<Result<WorkerExit, JobError>>,
    token: CancellationToken,
}

struct Inner {
    service: Arc<UsageService>,
    catalog: Arc<dyn ResourceCatalog>,
    stores: JobStores,
    config: JobConfig,
    resource_kind: String,
    events: broadcast::Sender<JobEvent>,
    dispatch: tokio::sync::Mutex<()>,
    worker: Mutex<Option<WorkerSlot>>,
}

/// Coordinates batch jobs over a persisted queue.
///
/// One manager is created per process and shared by cloning; clones share
/// the same worker slot. All job state lives in the [`KeyValueStore`], so
/// managers in separate processes over the same store see one job.
///
/// At most one job is active. Start, enqueue, resume and cancel are
/// serialized by an internal lock; progress reads and scans are not.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("resource_kind", &self.inner.resource_kind)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl JobManager {
    /// Creates a manager over `sources`, persisting into `store`.
    pub fn new(sources: ContentSources, store: Arc<dyn KeyValueStore>, config: Config) -> Self {
        let Config { scan, jobs } = config;
        let keys = JobKeys::new(&scan.storage_namespace);
        let stores = JobStores {
            queue: JobQueue::new(Arc::clone(&store), keys.queue.clone()),
            progress: ProgressTracker::new(
                Arc::clone(&store),
                keys.progress.clone(),
                jobs.seconds_per_item,
            ),
            control: JobControl::new(Arc::clone(&store), keys),
        };
        let catalog = Arc::clone(&sources.catalog);
        let resource_kind = scan.resource_kind.clone();
        let service = Arc::new(UsageService::new(sources, store, scan));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            inner: Arc::new(Inner {
                service,
                catalog,
                stores,
                config: jobs,
                resource_kind,
                events,
                dispatch: tokio::sync::Mutex::new(()),
                worker: Mutex::new(None),
            }),
        }
    }

    /// The scan service used by the worker.
    #[must_use]
    pub fn service(&self) -> &Arc<UsageService> {
        &self.inner.service
    }

    /// Job configuration.
    #[must_use]
    pub fn config(&self) -> &JobConfig {
        &self.inner.config
    }

    /// Receives worker events from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// The persisted job state.
    pub fn state(&self) -> Result<JobState, JobError> {
        Ok(self.inner.stores.control.state()?)
    }

    /// Returns `true` while a job is queued or in flight.
    ///
    /// Reads persisted state only, so a restarted process sees a job that a
    /// previous process left behind.
    pub fn is_running(&self) -> Result<bool, JobError> {
        let stores = &self.inner.stores;
        Ok(!stores.queue.is_empty()? || stores.control.state()?.is_active())
    }

    /// Returns `true` if this process has a worker task alive.
    #[must_use]
    pub fn worker_active(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Enqueues every unprocessed resource and starts a worker.
    ///
    /// Idempotent while a job is active. Reports "nothing to do" without any
    /// state change when every resource is already processed.
    pub async fn start_job(&self) -> Result<StartReport, JobError> {
        let _guard = self.inner.dispatch.lock().await;
        let report = self.dispatch()?;
        if report.started {
            self.spawn_worker()?;
        }
        Ok(report)
    }

    /// Enqueues every unprocessed resource without starting a worker.
    ///
    /// The host is expected to drive the queue later with [`resume`](Self::resume),
    /// possibly from another process.
    pub async fn enqueue_job(&self) -> Result<StartReport, JobError> {
        let _guard = self.inner.dispatch.lock().await;
        self.dispatch()
    }

    /// Starts a worker for a job left queued by an earlier process.
    ///
    /// Returns `false` if a worker is already alive here or nothing is queued.
    pub async fn resume(&self) -> Result<bool, JobError> {
        let _guard = self.inner.dispatch.lock().await;
        if self.worker_active() {
            return Ok(false);
        }

        let control = &self.inner.stores.control;
        let state = control.state()?;
        let queued = !self.inner.stores.queue.is_empty()?;
        if !queued && !state.is_active() {
            return Ok(false);
        }
        if state != JobState::Running && state != JobState::Cancelling {
            control.set_state(JobState::Running)?;
        }
        info!(%state, queued, "resuming job");
        self.spawn_worker()?;
        Ok(true)
    }

    /// Requests the running job to stop and waits for the worker.
    ///
    /// Waits at most `cancel_timeout_ms`. When the worker stops in time the
    /// queue and flag are cleared and the job ends `Cancelled`; the progress
    /// counters are kept so callers can see how far it got. Cancelling with
    /// no job active is a successful no-op.
    pub async fn cancel_job(&self) -> Result<CancelReport, JobError> {
        let _guard = self.inner.dispatch.lock().await;
        if !self.is_running()? {
            return Ok(CancelReport::new(false, "No job is running"));
        }

        let control = &self.inner.stores.control;
        control.request_cancel()?;
        control.set_state(JobState::Cancelling)?;
        if let Some(slot) = self.inner.worker.lock().as_ref() {
            slot.token.cancel();
        }
        info!("cancel requested");

        let deadline = Instant::now() + self.inner.config.cancel_timeout();
        let status = loop {
            let status = control.worker_status()?;
            if status != WorkerStatus::Running {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = self.inner.config.cancel_timeout_ms,
                    "worker did not stop in time"
                );
                return Ok(CancelReport::new(
                    false,
                    "Cancel requested; the worker has not stopped yet",
                ));
            }
            sleep(self.inner.config.cancel_poll_interval()).await;
        };

        let final_state = control.state()?;
        self.inner.stores.queue.clear()?;
        control.clear_cancel()?;
        if status == WorkerStatus::Completed || final_state == JobState::Completed {
            control.set_state(JobState::Completed)?;
            info!("cancel arrived after the job completed");
            return Ok(CancelReport::new(false, "Job already completed"));
        }
        control.set_state(JobState::Cancelled)?;
        Ok(CancelReport::new(true, "Job cancelled"))
    }

    /// Waits for this process's worker to finish.
    ///
    /// Returns `None` if no worker was started here.
    pub async fn join_worker(&self) -> Result<Option<WorkerExit>, JobError> {
        let slot = self.inner.worker.lock().take();
        match slot {
            Some(slot) => Ok(Some(slot.handle.await??)),
            None => Ok(None),
        }
    }

    /// Current counters and time estimate.
    ///
    /// When no job has ever run, the counters are initialised from the
    /// catalog and the processed markers, and persisted.
    pub fn request_progress(&self) -> Result<ProgressReport, JobError> {
        let tracker = &self.inner.stores.progress;
        let state = match tracker.load()? {
            Some(state) => state,
            None => {
                let state = self.initial_progress()?;
                tracker.store(&state)?;
                debug!(total = state.total, processed = state.processed, "progress initialised");
                state
            }
        };
        let estimate = tracker.estimate_remaining(state.pending);
        Ok(ProgressReport {
            processed: state.processed,
            pending: state.pending,
            total: state.total,
            estimated_time: estimate.value,
            time_unit: estimate.unit,
        })
    }

    /// Scans a caller-supplied resource id.
    pub fn request_scan(&self, raw: &str) -> Result<UsageReport, JobError> {
        Ok(self.inner.service.request_scan(raw)?)
    }

    /// Host hook: a resource was edited or deleted.
    pub fn on_resource_mutated(&self, id: ResourceId) -> Result<bool, JobError> {
        Ok(self.inner.service.invalidate_resource(id)?)
    }

    /// Host hook: an entity was edited or deleted.
    pub fn on_entity_mutated(&self, entity: &EntityKey) -> Result<Vec<ResourceId>, JobError> {
        Ok(self.inner.service.invalidate_entity(entity)?)
    }

    /// Host hook: a burst of mutations.
    pub fn on_mutations(&self, batch: &MutationBatch) -> Result<BatchOutcome, JobError> {
        Ok(self.inner.service.apply(batch)?)
    }

    fn enumerate(&self) -> Result<BTreeSet<ResourceId>, JobError> {
        let raw = self.inner.catalog.list_resource_ids(&self.inner.resource_kind)?;
        let total = raw.len();
        let ids: BTreeSet<ResourceId> = raw.into_iter().filter_map(ResourceId::from_raw).collect();
        if ids.len() != total {
            debug!(skipped = total - ids.len(), "ignored invalid or duplicate resource ids");
        }
        Ok(ids)
    }

    fn initial_progress(&self) -> Result<ProgressState, JobError> {
        let ids = self.enumerate()?;
        let processed: BTreeSet<ResourceId> =
            self.inner.service.cache().processed_ids()?.into_iter().collect();
        let total = ids.len() as u64;
        let done = ids.intersection(&processed).count() as u64;
        Ok(ProgressState {
            total,
            processed: done,
            pending: total - done,
        })
    }

    fn dispatch(&self) -> Result<StartReport, JobError> {
        let control = &self.inner.stores.control;
        let previous = control.state()?;
        if previous.is_active() || !self.inner.stores.queue.is_empty()? {
            return Ok(StartReport::not_started("A job is already running"));
        }

        control.set_state(JobState::Dispatching)?;
        match self.enqueue_unprocessed() {
            Ok(0) => {
                control.set_state(previous)?;
                info!("nothing to process");
                Ok(StartReport::not_started("Nothing to do: every resource is processed"))
            }
            Ok(enqueued) => {
                info!(enqueued, "job dispatched");
                Ok(StartReport {
                    started: true,
                    message: format!("Processing started for {enqueued} resources"),
                    enqueued,
                })
            }
            Err(err) => {
                if let Err(restore) = control.set_state(previous) {
                    warn!(error = %restore, "failed to restore job state");
                }
                Err(err)
            }
        }
    }

    fn enqueue_unprocessed(&self) -> Result<usize, JobError> {
        let cache = self.inner.service.cache();
        let processed: BTreeSet<ResourceId> = cache.processed_ids()?.into_iter().collect();
        let entries: Vec<JobQueueEntry> = self
            .enumerate()?
            .into_iter()
            .filter(|id| !processed.contains(id))
            .map(JobQueueEntry::new)
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let stores = &self.inner.stores;
        stores.queue.save(&entries)?;
        stores.progress.reset(entries.len() as u64)?;
        stores.control.clear_cancel()?;
        stores.control.set_worker_status(WorkerStatus::Stopped)?;
        stores.control.set_state(JobState::Running)?;
        Ok(entries.len())
    }

    fn spawn_worker(&self) -> Result<(), JobError> {
        let mut slot = self.inner.worker.lock();
        self.inner
            .stores
            .control
            .set_worker_status(WorkerStatus::Running)?;

        let token = CancellationToken::new();
        let worker = Worker::new(
            Arc::clone(&self.inner.service),
            self.inner.stores.clone(),
            self.inner.config.chunk_size,
            self.inner.config.chunk_delay(),
            self.inner.events.clone(),
            token.clone(),
        );
        let handle = tokio::spawn(worker.run());
        *slot = Some(WorkerSlot { handle, token });
        Ok(())
    }
}
