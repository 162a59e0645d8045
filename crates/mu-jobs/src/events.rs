//! Events broadcast while a job runs.

use mu_core::{ProgressState, ResourceId};
use serde::{Deserialize, Serialize};

/// Capacity of the event broadcast channel.
///
/// Slow subscribers that fall further behind than this miss events
/// (`RecvError::Lagged`); the persisted progress stays authoritative.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A worker began draining the queue.
    WorkerStarted {
        /// Entries queued when the worker started.
        queued: usize,
    },
    /// One resource was scanned.
    UnitProcessed {
        /// The scanned resource.
        resource_id: ResourceId,
        /// References found.
        references: usize,
        /// Counters after this unit.
        progress: ProgressState,
    },
    /// The queue drained.
    Completed {
        /// Final counters.
        progress: ProgressState,
    },
    /// The worker stopped on a cancel request.
    Cancelled {
        /// Counters at the time of the stop.
        progress: ProgressState,
    },
    /// The worker stopped on an error.
    Failed {
        /// Error description.
        error: String,
    },
}

impl JobEvent {
    /// Returns `true` for events after which the worker is gone.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Cancelled { .. } | Self::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(JobEvent::Completed { progress: ProgressState::new(0) }.is_terminal());
        assert!(JobEvent::Failed { error: "x".into() }.is_terminal());
        assert!(!JobEvent::WorkerStarted { queued: 1 }.is_terminal());
    }

    #[test]
    fn test_event_shape() {
        let event = JobEvent::UnitProcessed {
            resource_id: ResourceId::new(7).unwrap(),
            references: 2,
            progress: ProgressState { total: 3, processed: 1, pending: 2 },
        };
        insta::assert_json_snapshot!(event, @r#"
        {
          "event": "unit_processed",
          "resource_id": 7,
          "references": 2,
          "progress": {
            "total": 3,
            "processed": 1,
            "pending": 2
          }
        }
        "#);
    }
}
