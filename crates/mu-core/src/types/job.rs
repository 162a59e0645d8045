//! Batch job types: queue entries, progress counters, and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ResourceId;

/// One unit of work: a resource awaiting scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobQueueEntry {
    /// The resource to scan.
    pub resource_id: ResourceId,

    /// When the entry was enqueued.
    pub enqueued_at: DateTime<Utc>,
}

impl JobQueueEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            enqueued_at: Utc::now(),
        }
    }
}

/// Aggregate job counters.
///
/// `processed + pending == total` holds at every quiescent point.
/// [`advance`](Self::advance) clamps so that `processed` never exceeds
/// `total` and `pending` never drops below zero.
///
/// # Examples
///
/// ```
/// use mu_core::ProgressState;
///
/// let mut progress = ProgressState::new(2);
/// progress.advance();
/// progress.advance();
/// progress.advance();
///
/// assert_eq!(progress.processed, 2);
/// assert_eq!(progress.pending, 0);
/// assert!(progress.is_complete());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    /// Resources in the current job.
    pub total: u64,
    /// Resources scanned so far.
    pub processed: u64,
    /// Resources still queued.
    pub pending: u64,
}

impl ProgressState {
    /// Fresh counters for a job of `total` resources.
    #[inline]
    #[must_use]
    pub const fn new(total: u64) -> Self {
        Self {
            total,
            processed: 0,
            pending: total,
        }
    }

    /// Records one completed unit.
    pub fn advance(&mut self) {
        self.processed = self.processed.saturating_add(1).min(self.total);
        self.pending = self.pending.saturating_sub(1);
    }

    /// Returns `true` when nothing is pending.
    #[inline]
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.pending == 0
    }

    /// Returns `true` when the counters satisfy `processed + pending == total`.
    #[inline]
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.processed.saturating_add(self.pending) == self.total
    }
}

/// Lifecycle of a batch job.
///
/// ```text
/// Idle ─► Dispatching ─► Running ─┬─► Completed
///                                 └─► Cancelling ─► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job has been started.
    #[default]
    Idle,
    /// A start request is enumerating and enqueuing resources.
    Dispatching,
    /// The worker is draining the queue.
    Running,
    /// A cancel request is waiting for the worker to stop.
    Cancelling,
    /// The last job was cancelled.
    Cancelled,
    /// The last job drained its queue.
    Completed,
}

impl JobState {
    /// Returns `true` while a job is in flight.
    ///
    /// # Examples
    ///
    /// ```
    /// use mu_core::JobState;
    ///
    /// assert!(JobState::Running.is_active());
    /// assert!(JobState::Cancelling.is_active());
    /// assert!(!JobState::Completed.is_active());
    /// ```
    #[inline]
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Dispatching | Self::Running | Self::Cancelling)
    }

    /// Returns `true` if a new job may be started from this state.
    #[inline]
    #[must_use]
    pub const fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Cancelled)
    }

    /// Returns the snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatching => "dispatching",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
