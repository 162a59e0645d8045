//! Persisted job state, cancellation flag and worker status.
//!
//! These three keys let separate processes coordinate: a cancel request in
//! one process sets the flag, the worker in another observes it and reports
//! itself stopped.

use std::sync::Arc;

use mu_core::{JobState, KeyValueStore, KeyValueStoreExt, StoreError};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::worker::WorkerExit;

/// Storage keys for one job namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKeys {
    /// Prefix of the pending entries, one key per entry.
    pub queue: String,
    /// The progress counters.
    pub progress: String,
    /// The job lifecycle state.
    pub state: String,
    /// The cancellation flag.
    pub cancel: String,
    /// The worker status.
    pub worker: String,
}

impl JobKeys {
    /// Keys under `{namespace}:jobs:`.
    ///
    /// ```
    /// use mu_jobs::JobKeys;
    ///
    /// let keys = JobKeys::new("media_usage");
    /// assert_eq!(keys.queue, "media_usage:jobs:queue");
    /// ```
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        let key = |name: &str| format!("{namespace}:jobs:{name}");
        Self {
            queue: key("queue"),
            progress: key("progress"),
            state: key("state"),
            cancel: key("cancel"),
            worker: key("worker"),
        }
    }
}

/// Whether a worker is draining the queue, and how the last one ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// A worker is running.
    Running,
    /// No worker is running: none has started since the job was queued, or
    /// the last one stopped on an error.
    #[default]
    Stopped,
    /// The last worker drained the queue.
    Completed,
    /// The last worker observed a cancel request.
    Cancelled,
}

impl From<WorkerExit> for WorkerStatus {
    fn from(exit: WorkerExit) -> Self {
        match exit {
            WorkerExit::Completed => Self::Completed,
            WorkerExit::Cancelled => Self::Cancelled,
        }
    }
}

/// Reads and writes the job state, cancellation flag and worker status.
#[derive(Clone)]
pub struct JobControl {
    store: Arc<dyn KeyValueStore>,
    keys: JobKeys,
}

impl std::fmt::Debug for JobControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobControl").field("keys", &self.keys).finish_non_exhaustive()
    }
}

impl JobControl {
    /// Creates a controller over `keys`.
    pub fn new(store: Arc<dyn KeyValueStore>, keys: JobKeys) -> Self {
        Self { store, keys }
    }

    fn read_or_default<T>(&self, key: &str) -> Result<T, StoreError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match self.store.get_json::<T>(key) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(err) if err.is_corruption() => {
                warn!(key, error = %err, "unreadable job control value, using default");
                self.store.delete(key)?;
                Ok(T::default())
            }
            Err(err) => Err(err),
        }
    }

    /// The persisted lifecycle state. [`JobState::Idle`] if never set.
    pub fn state(&self) -> Result<JobState, StoreError> {
        self.read_or_default(&self.keys.state)
    }

    /// Persists the lifecycle state.
    pub fn set_state(&self, state: JobState) -> Result<(), StoreError> {
        self.store.set_json(&self.keys.state, &state)
    }

    /// Returns `true` if a cancel has been requested and not yet cleared.
    pub fn cancel_requested(&self) -> Result<bool, StoreError> {
        self.read_or_default(&self.keys.cancel)
    }

    /// Sets the cancellation flag.
    pub fn request_cancel(&self) -> Result<(), StoreError> {
        self.store.set_json(&self.keys.cancel, &true)
    }

    /// Clears the cancellation flag.
    pub fn clear_cancel(&self) -> Result<(), StoreError> {
        self.store.delete(&self.keys.cancel)?;
        Ok(())
    }

    /// The persisted worker status. [`WorkerStatus::Stopped`] if never set.
    pub fn worker_status(&self) -> Result<WorkerStatus, StoreError> {
        self.read_or_default(&self.keys.worker)
    }

    /// Persists the worker status.
    pub fn set_worker_status(&self, status: WorkerStatus) -> Result<(), StoreError> {
        self.store.set_json(&self.keys.worker, &status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_core::MemoryKvStore;

    fn control() -> (Arc<MemoryKvStore>, JobControl) {
        let store = Arc::new(MemoryKvStore::new());
        let control = JobControl::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, JobKeys::new("t"));
        (store, control)
    }

    #[test]
    fn test_defaults() {
        let (_, control) = control();
        assert_eq!(control.state().unwrap(), JobState::Idle);
        assert!(!control.cancel_requested().unwrap());
        assert_eq!(control.worker_status().unwrap(), WorkerStatus::Stopped);
    }

    #[test]
    fn test_cancel_flag() {
        let (_, control) = control();
        control.request_cancel().unwrap();
        assert!(control.cancel_requested().unwrap());
        control.clear_cancel().unwrap();
        assert!(!control.cancel_requested().unwrap());
    }

    #[test]
    fn test_state_roundtrip() {
        let (store, control) = control();
        control.set_state(JobState::Running).unwrap();
        assert_eq!(control.state().unwrap(), JobState::Running);
        assert_eq!(store.get("t:jobs:state").unwrap().as_deref(), Some("\"running\""));
    }

    #[test]
    fn test_worker_status_records_exit() {
        let (store, control) = control();
        control.set_worker_status(WorkerExit::Completed.into()).unwrap();
        assert_eq!(control.worker_status().unwrap(), WorkerStatus::Completed);
        assert_eq!(store.get("t:jobs:worker").unwrap().as_deref(), Some("\"completed\""));

        control.set_worker_status(WorkerExit::Cancelled.into()).unwrap();
        assert_eq!(control.worker_status().unwrap(), WorkerStatus::Cancelled);
    }

    #[test]
    fn test_corrupt_state_falls_back() {
        let (store, control) = control();
        store.set("t:jobs:state", "\"exploded\"".to_owned()).unwrap();
        assert_eq!(control.state().unwrap(), JobState::Idle);
    }
}
