//! Reference scanner and usage cache for media usage tracking.
//!
//! This crate answers "is this resource used anywhere?" for a single
//! resource id, and keeps the answer cached until something changes.
//!
//! # Overview
//!
//! - [`Scanner`]: runs the five lookup phases and deduplicates the results
//! - [`UsageCache`]: persisted records, processed markers and reverse index
//! - [`UsageService`]: cache-gated scanning, invalidation hooks, deletion guard
//! - [`MutationBatch`]: deduplicated bursts of host mutation events
//! - [`ScanStats`]: atomic counters for scanner activity
//!
//! # Architecture
//!
//! ```text
//! UsageService
//!     │
//!     ├── UsageCache ── KeyValueStore
//!     │
//!     ├── Scanner
//!     │       │
//!     │       ├── phases (featured → content → attribute → settings → taxonomy)
//!     │       └── ReferenceCollector (first bucket hit wins)
//!     │
//!     └── ScanStats
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use mu_core::{ContentSources, EntityEntry, MemoryContentStore, MemoryKvStore, ScanConfig};
//! use mu_scanner::UsageService;
//!
//! let site = Arc::new(MemoryContentStore::default());
//! site.upsert_entity(EntityEntry::new(3, "Home").with_primary_reference(12));
//!
//! let service = UsageService::new(
//!     ContentSources::from_store(site),
//!     Arc::new(MemoryKvStore::new()),
//!     ScanConfig::default(),
//! );
//!
//! let report = service.request_scan("12")?;
//! assert!(report.used);
//! assert_eq!(report.references[0].label, "Home");
//! # Ok::<(), mu_scanner::ScanError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod cache;
mod collector;
mod error;
mod events;
mod phases;
mod service;
mod stats;

pub use cache::UsageCache;
pub use collector::ReferenceCollector;
pub use error::ScanError;
pub use events::{MutationBatch, MutationBatchStats, MutationEvent};
pub use service::{BatchOutcome, ScanOutcome, UsageReport, UsageService};
pub use stats::{ScanStats, StatsSnapshot};

use mu_core::{ContentSources, Reference, ReferenceKind, ResourceId, ScanConfig};
use smallvec::SmallVec;
use tracing::{debug, warn};

/// The result of running every lookup phase once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// Deduplicated references in discovery order.
    pub references: Vec<Reference>,

    /// Phases that failed and contributed nothing.
    pub degraded: SmallVec<[ReferenceKind; 2]>,
}

impl Lookup {
    /// Returns `true` if every phase answered.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Searches every lookup source for references to a resource.
///
/// The scanner is stateless apart from its collaborators: it never reads or
/// writes the cache. Use [`UsageService`] for cache-gated scans.
#[derive(Debug, Clone)]
pub struct Scanner {
    sources: ContentSources,
    config: ScanConfig,
}

impl Scanner {
    /// Creates a scanner over `sources`.
    #[must_use]
    pub const fn new(sources: ContentSources, config: ScanConfig) -> Self {
        Self { sources, config }
    }

    /// The lookup sources.
    #[must_use]
    pub const fn sources(&self) -> &ContentSources {
        &self.sources
    }

    /// The scanner configuration.
    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Runs the five phases in order for `id`.
    ///
    /// A failing phase is logged and skipped; the remaining phases still run.
    /// A resource nobody references yields an empty, complete lookup.
    pub fn lookup(&self, id: ResourceId) -> Lookup {
        let mut collector = ReferenceCollector::new();
        let mut degraded = SmallVec::new();

        for phase in ReferenceKind::ALL {
            match phases::run(phase, &self.sources, &self.config, id) {
                Ok(found) => {
                    let added = collector.extend(found);
                    debug!(resource = %id, %phase, added, "phase complete");
                }
                Err(source) => {
                    let err = ScanError::lookup(phase, source);
                    warn!(resource = %id, error = %err, "lookup phase degraded");
                    degraded.push(phase);
                }
            }
        }

        Lookup {
            references: collector.into_references(),
            degraded,
        }
    }
}
