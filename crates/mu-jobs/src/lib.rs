//! Persisted batch jobs that scan every resource in the catalog.
//!
//! # Overview
//!
//! - [`JobManager`]: start, resume, cancel and progress for the one active job
//! - [`JobQueue`]: pending entries, persisted one key per entry
//! - [`ProgressTracker`]: `{total, processed, pending}` and the time estimate
//! - [`JobControl`]: lifecycle state, cancellation flag, worker status
//! - [`JobEvent`]: broadcast as the worker makes progress
//!
//! # Architecture
//!
//! ```text
//! JobManager ──spawn──► worker task
//!     │                     │
//!     │                     ├── UsageService::scan   (spawn_blocking, per unit)
//!     │                     ├── JobQueue / ProgressTracker
//!     │                     └── broadcast::Sender<JobEvent>
//!     │
//!     └── KeyValueStore (queue, progress, state, cancel flag, worker status)
//! ```
//!
//! Everything the worker needs survives a restart: a second process over the
//! same store calls [`JobManager::resume`] and continues with the next queued
//! entry.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod control;
mod error;
mod events;
mod manager;
mod progress;
mod queue;
mod worker;

pub use control::{JobControl, JobKeys, WorkerStatus};
pub use error::JobError;
pub use events::{EVENT_CHANNEL_CAPACITY, JobEvent};
pub use manager::{CancelReport, JobManager, ProgressReport, StartReport};
pub use progress::{Estimate, ProgressTracker, TimeUnit, estimate_remaining};
pub use queue::JobQueue;
pub use worker::WorkerExit;
