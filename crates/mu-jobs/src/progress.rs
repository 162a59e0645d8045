//! Persisted progress counters and the remaining-time estimate.
//!
//! Every mutation is a read-modify-write of one key. Lost updates are
//! possible with concurrent writers, but only the single worker ever calls
//! [`ProgressTracker::advance`].

use std::fmt;
use std::sync::Arc;

use mu_core::{KeyValueStore, KeyValueStoreExt, ProgressState, StoreError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Unit of an [`Estimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Seconds => "seconds",
            Self::Minutes => "minutes",
        })
    }
}

/// Estimated time to drain the queue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Amount of time, in `unit`.
    pub value: f64,
    /// Unit of `value`.
    pub unit: TimeUnit,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimates the time needed for `pending` items at `seconds_per_item`.
///
/// Under a minute the estimate is in seconds. From 60 seconds on it is in
/// whole minutes, keeping two decimals only if rounding would give zero.
///
/// # Examples
///
/// ```
/// use mu_jobs::{TimeUnit, estimate_remaining};
///
/// let zero = estimate_remaining(0, 0.5);
/// assert_eq!((zero.value, zero.unit), (0.0, TimeUnit::Seconds));
///
/// let short = estimate_remaining(10, 0.5);
/// assert_eq!((short.value, short.unit), (5.0, TimeUnit::Seconds));
///
/// let long = estimate_remaining(500, 0.5);
/// assert_eq!((long.value, long.unit), (4.0, TimeUnit::Minutes));
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)] // pending counts stay far below 2^52
pub fn estimate_remaining(pending: u64, seconds_per_item: f64) -> Estimate {
    let seconds = pending as f64 * seconds_per_item;
    if seconds >= 60.0 {
        let minutes = seconds / 60.0;
        let whole = minutes.round();
        Estimate {
            value: if whole == 0.0 { round2(minutes) } else { whole },
            unit: TimeUnit::Minutes,
        }
    } else {
        Estimate {
            value: round2(seconds),
            unit: TimeUnit::Seconds,
        }
    }
}

/// Reads and advances the persisted [`ProgressState`].
#[derive(Clone)]
pub struct ProgressTracker {
    store: Arc<dyn KeyValueStore>,
    key: String,
    seconds_per_item: f64,
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("key", &self.key)
            .field("seconds_per_item", &self.seconds_per_item)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Creates a tracker stored under `key`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, seconds_per_item: f64) -> Self {
        Self {
            store,
            key: key.into(),
            seconds_per_item,
        }
    }

    /// Returns the persisted state, or `None` if no job has initialised it.
    ///
    /// Undecodable state is logged and reported as absent.
    pub fn load(&self) -> Result<Option<ProgressState>, StoreError> {
        match self.store.get_json::<ProgressState>(&self.key) {
            Ok(state) => Ok(state),
            Err(err) if err.is_corruption() => {
                warn!(key = %self.key, error = %err, "progress state unreadable, resetting");
                self.store.delete(&self.key)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the current counters, all zero if none are persisted.
    pub fn snapshot(&self) -> Result<ProgressState, StoreError> {
        Ok(self.load()?.unwrap_or_default())
    }

    /// Persists `state` as is.
    pub fn store(&self, state: &ProgressState) -> Result<(), StoreError> {
        self.store.set_json(&self.key, state)
    }

    /// Starts counting a job of `total` resources.
    pub fn reset(&self, total: u64) -> Result<ProgressState, StoreError> {
        let state = ProgressState::new(total);
        self.store(&state)?;
        Ok(state)
    }

    /// Records one completed unit and returns the new counters.
    pub fn advance(&self) -> Result<ProgressState, StoreError> {
        let mut state = self.snapshot()?;
        state.advance();
        self.store(&state)?;
        Ok(state)
    }

    /// Removes the persisted counters.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(&self.key)?;
        Ok(())
    }

    /// Estimate for `pending` items at this tracker's rate.
    #[must_use]
    pub fn estimate_remaining(&self, pending: u64) -> Estimate {
        estimate_remaining(pending, self.seconds_per_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_core::MemoryKvStore;

    fn tracker() -> (Arc<MemoryKvStore>, ProgressTracker) {
        let store = Arc::new(MemoryKvStore::new());
        let tracker = ProgressTracker::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, "p", 0.5);
        (store, tracker)
    }

    #[test]
    fn test_estimate_zero() {
        let estimate = estimate_remaining(0, 0.5);
        assert!(estimate.value.abs() < f64::EPSILON);
        assert_eq!(estimate.unit, TimeUnit::Seconds);
    }

    #[test]
    fn test_estimate_seconds_keep_decimals() {
        let estimate = estimate_remaining(3, 0.333);
        assert!((estimate.value - 1.0).abs() < 1e-9);
        assert_eq!(estimate.unit, TimeUnit::Seconds);

        let estimate = estimate_remaining(119, 0.5);
        assert!((estimate.value - 59.5).abs() < 1e-9);
        assert_eq!(estimate.unit, TimeUnit::Seconds);
    }

    #[test]
    fn test_estimate_minutes_round_whole() {
        let estimate = estimate_remaining(120, 0.5);
        assert!((estimate.value - 1.0).abs() < f64::EPSILON);
        assert_eq!(estimate.unit, TimeUnit::Minutes);

        let estimate = estimate_remaining(1_000, 0.5);
        assert!((estimate.value - 8.0).abs() < f64::EPSILON);
        assert_eq!(estimate.unit, TimeUnit::Minutes);
    }

    #[test]
    fn test_reset_and_advance() {
        let (_, tracker) = tracker();
        assert_eq!(tracker.load().unwrap(), None);
        assert_eq!(tracker.snapshot().unwrap(), ProgressState::default());

        tracker.reset(2).unwrap();
        tracker.advance().unwrap();
        let state = tracker.advance().unwrap();
        assert_eq!(state, ProgressState { total: 2, processed: 2, pending: 0 });

        let clamped = tracker.advance().unwrap();
        assert_eq!(clamped, state);
    }

    #[test]
    fn test_corrupt_state_is_dropped() {
        let (store, tracker) = tracker();
        store.set("p", "{\"total\": \"many\"}".to_owned()).unwrap();
        assert_eq!(tracker.load().unwrap(), None);
        assert_eq!(store.get("p").unwrap(), None);
    }

    #[test]
    fn test_time_unit_display() {
        assert_eq!(TimeUnit::Minutes.to_string(), "minutes");
        assert_eq!(serde_json::to_string(&TimeUnit::Seconds).unwrap(), "\"seconds\"");
    }
}
