//! Scan statistics with atomic counters.
//!
//! This module provides [`ScanStats`] for counting scanner activity and
//! [`StatsSnapshot`] for point-in-time views.
//!
//! All counters use [`Relaxed`](std::sync::atomic::Ordering::Relaxed)
//! ordering. They are informational and never used for coordination.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic counters for scanner activity.
///
/// # Examples
///
/// ```
/// use mu_scanner::ScanStats;
///
/// let stats = ScanStats::new();
/// stats.record_scan(3, 0);
/// stats.record_cache_hit();
///
/// let snap = stats.snapshot();
/// assert_eq!(snap.scans, 1);
/// assert_eq!(snap.references, 3);
/// assert!((snap.cache_hit_rate() - 50.0).abs() < 0.1);
/// ```
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Full scans executed against the lookup sources.
    scans: AtomicU64,
    /// Scans answered from the usage cache.
    cache_hits: AtomicU64,
    /// References found by full scans.
    references: AtomicU64,
    /// Lookup phases that failed and were degraded.
    degraded_phases: AtomicU64,
    /// Usage records removed by invalidation.
    invalidations: AtomicU64,
}

impl ScanStats {
    /// Creates a new [`ScanStats`] with all counters at zero.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed full scan.
    #[inline]
    pub fn record_scan(&self, references: usize, degraded: usize) {
        self.scans.fetch_add(1, Ordering::Relaxed);
        self.references.fetch_add(references as u64, Ordering::Relaxed);
        self.degraded_phases.fetch_add(degraded as u64, Ordering::Relaxed);
    }

    /// Records a cache hit.
    #[inline]
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Records invalidated records.
    #[inline]
    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            references: self.references.load(Ordering::Relaxed),
            degraded_phases: self.degraded_phases.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.scans.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.references.store(0, Ordering::Relaxed);
        self.degraded_phases.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of [`ScanStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Full scans executed.
    pub scans: u64,
    /// Scans answered from the cache.
    pub cache_hits: u64,
    /// References found by full scans.
    pub references: u64,
    /// Degraded lookup phases.
    pub degraded_phases: u64,
    /// Records removed by invalidation.
    pub invalidations: u64,
}

impl StatsSnapshot {
    /// Share of requests answered from the cache, as a percentage.
    ///
    /// Returns 0.0 when nothing was requested.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Display only
    pub fn cache_hit_rate(&self) -> f64 {
        let requests = self.scans + self.cache_hits;
        if requests == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / requests as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ScanStats::new();
        stats.record_scan(2, 1);
        stats.record_scan(0, 0);
        stats.record_invalidations(3);

        let snap = stats.snapshot();
        assert_eq!(snap.scans, 2);
        assert_eq!(snap.references, 2);
        assert_eq!(snap.degraded_phases, 1);
        assert_eq!(snap.invalidations, 3);
    }

    #[test]
    fn test_reset() {
        let stats = ScanStats::new();
        stats.record_cache_hit();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate_empty() {
        assert!(StatsSnapshot::default().cache_hit_rate().abs() < f64::EPSILON);
    }
}
