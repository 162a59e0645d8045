//! Cache-gated scanning and invalidation hooks.

use std::sync::Arc;

use mu_core::{
    ContentSources, EntityKey, KeyValueStore, Reference, ReferenceKind, ResourceId, ScanConfig,
    UsageRecord,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::cache::UsageCache;
use crate::error::ScanError;
use crate::events::MutationBatch;
use crate::stats::{ScanStats, StatsSnapshot};
use crate::{Lookup, Scanner};

/// The result of a cache-gated scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// The scanned resource.
    pub resource_id: ResourceId,
    /// References in discovery order.
    pub references: Vec<Reference>,
    /// `true` if the cache answered.
    pub from_cache: bool,
    /// Phases that failed during a fresh scan. Empty for cache hits.
    pub degraded: SmallVec<[ReferenceKind; 2]>,
}

impl ScanOutcome {
    /// Returns `true` if every phase answered.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

/// Answer to a scan request from the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    /// Whether any reference was found.
    pub used: bool,
    /// The references found.
    pub references: Vec<Reference>,
}

impl UsageReport {
    /// A report for a resource with no references.
    #[must_use]
    pub fn unused() -> Self {
        Self::default()
    }
}

impl From<ScanOutcome> for UsageReport {
    fn from(outcome: ScanOutcome) -> Self {
        Self {
            used: !outcome.references.is_empty(),
            references: outcome.references,
        }
    }
}

/// What a [`MutationBatch`] invalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Resources whose cached state was removed, sorted and distinct.
    pub invalidated: Vec<ResourceId>,
}

/// Scanner, cache and statistics behind one service object.
///
/// `scan` consults the cache first; a hit never touches the lookup sources.
/// A fresh scan is cached only when every phase answered. A scan with a
/// degraded phase is returned to the caller but neither cached nor marked
/// processed, so the resource is picked up again by the next job.
#[derive(Debug)]
pub struct UsageService {
    scanner: Scanner,
    cache: UsageCache,
    stats: ScanStats,
}

impl UsageService {
    /// Creates a service.
    pub fn new(
        sources: ContentSources,
        store: Arc<dyn KeyValueStore>,
        config: ScanConfig,
    ) -> Self {
        let cache = UsageCache::new(store, config.storage_namespace.clone());
        Self {
            scanner: Scanner::new(sources, config),
            cache,
            stats: ScanStats::new(),
        }
    }

    /// The underlying scanner.
    #[must_use]
    pub const fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// The usage cache.
    #[must_use]
    pub const fn cache(&self) -> &UsageCache {
        &self.cache
    }

    /// Counters for this service.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the references to `id`, from the cache when possible.
    pub fn scan(&self, id: ResourceId) -> Result<ScanOutcome, ScanError> {
        if let Some(record) = self.cache.get(id)? {
            self.stats.record_cache_hit();
            debug!(resource = %id, "usage cache hit");
            return Ok(ScanOutcome {
                resource_id: id,
                references: record.references,
                from_cache: true,
                degraded: SmallVec::new(),
            });
        }

        let Lookup {
            references,
            degraded,
        } = self.scanner.lookup(id);
        self.stats.record_scan(references.len(), degraded.len());

        if degraded.is_empty() {
            if references.is_empty() {
                if self.is_cataloged(id) {
                    self.cache.mark_processed(id)?;
                }
            } else {
                let record = UsageRecord::new(id, references);
                self.cache.put(&record)?;
                return Ok(ScanOutcome {
                    resource_id: id,
                    references: record.references,
                    from_cache: false,
                    degraded,
                });
            }
        } else {
            warn!(resource = %id, degraded = degraded.len(), "partial scan not cached");
        }

        Ok(ScanOutcome {
            resource_id: id,
            references,
            from_cache: false,
            degraded,
        })
    }

    /// Unknown ids are scanned but never marked processed, so the markers
    /// only ever describe catalogued resources.
    fn is_cataloged(&self, id: ResourceId) -> bool {
        let kind = &self.scanner.config().resource_kind;
        match self.scanner.sources().catalog.contains_resource(kind, id) {
            Ok(true) => true,
            Ok(false) => {
                debug!(resource = %id, "not in the catalog, processed marker skipped");
                false
            }
            Err(err) => {
                warn!(resource = %id, error = %err, "catalog lookup failed, processed marker skipped");
                false
            }
        }
    }

    /// Scans a caller-supplied id.
    ///
    /// Malformed or non-positive ids report `used: false` rather than an error.
    pub fn request_scan(&self, raw: &str) -> Result<UsageReport, ScanError> {
        match ResourceId::parse(raw) {
            Some(id) => self.report(id),
            None => {
                debug!(input = raw, "ignoring invalid resource id");
                Ok(UsageReport::unused())
            }
        }
    }

    /// Scans `id` and reports whether it is used.
    pub fn report(&self, id: ResourceId) -> Result<UsageReport, ScanError> {
        self.scan(id).map(UsageReport::from)
    }

    /// Returns `false` if anything references `id`.
    pub fn can_delete(&self, id: ResourceId) -> Result<bool, ScanError> {
        Ok(self.scan(id)?.references.is_empty())
    }

    /// Drops cached state for a resource that changed.
    pub fn invalidate_resource(&self, id: ResourceId) -> Result<bool, ScanError> {
        let removed = self.cache.invalidate(id)?;
        if removed {
            self.stats.record_invalidations(1);
        }
        Ok(removed)
    }

    /// Drops cached state for every resource related to a changed entity.
    ///
    /// Records citing the entity are found through the reverse index. For
    /// content entities the forward lookup adds resources the entity
    /// references now, which covers resources newly embedded by this edit.
    /// A failing forward lookup is logged and the reverse purge still applies.
    ///
    /// Returns the affected resources, sorted and distinct.
    pub fn invalidate_entity(&self, entity: &EntityKey) -> Result<Vec<ResourceId>, ScanError> {
        let mut affected = self.cache.invalidate_referencing(entity)?;

        if let (EntityKey::Entity(entity_id), Some(forward)) = (entity, &self.scanner.sources().forward) {
            match forward.resources_referenced_by(*entity_id) {
                Ok(ids) => {
                    for id in ids {
                        if !affected.contains(&id) && self.cache.invalidate(id)? {
                            affected.push(id);
                        }
                    }
                }
                Err(err) => {
                    warn!(%entity, error = %err, "forward reference lookup failed");
                }
            }
        }

        affected.sort_unstable();
        affected.dedup();
        self.stats.record_invalidations(affected.len());
        if !affected.is_empty() {
            info!(%entity, invalidated = affected.len(), "entity mutation invalidated usage records");
        }
        Ok(affected)
    }

    /// Applies a deduplicated batch of mutations.
    pub fn apply(&self, batch: &MutationBatch) -> Result<BatchOutcome, ScanError> {
        let mut invalidated = Vec::new();
        for id in batch.unique_resources() {
            if self.invalidate_resource(id)? {
                invalidated.push(id);
            }
        }
        for entity in batch.unique_entities() {
            invalidated.extend(self.invalidate_entity(entity)?);
        }
        invalidated.sort_unstable();
        invalidated.dedup();
        Ok(BatchOutcome { invalidated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mu_core::{EntityEntry, EntityId, MemoryContentStore, MemoryKvStore, TermId};

    use crate::events::MutationEvent;

    fn id(raw: u64) -> ResourceId {
        ResourceId::new(raw).unwrap()
    }

    struct Fixture {
        site: Arc<MemoryContentStore>,
        kv: Arc<MemoryKvStore>,
        service: UsageService,
    }

    fn fixture() -> Fixture {
        let site = Arc::new(MemoryContentStore::default());
        site.add_resource(12, Some("https://example.test/uploads/cat.jpg".into()));
        site.add_resource(13, Some("https://example.test/uploads/dog.jpg".into()));
        site.upsert_entity(EntityEntry::new(1, "Home").with_primary_reference(12));
        site.upsert_entity(EntityEntry::new(2, "Blog").with_body("<img class=\"wp-image-12\">"));
        let kv = Arc::new(MemoryKvStore::new());
        let service = UsageService::new(
            ContentSources::from_store(Arc::clone(&site)),
            Arc::clone(&kv) as Arc<dyn KeyValueStore>,
            ScanConfig::default(),
        );
        Fixture { site, kv, service }
    }

    #[test]
    fn test_request_scan_unused() {
        let f = fixture();
        let report = f.service.request_scan("13").unwrap();
        assert_eq!(report, UsageReport::unused());
        assert!(f.service.cache().is_processed(id(13)).unwrap());
        assert!(f.service.cache().get(id(13)).unwrap().is_none());
    }

    #[test]
    fn test_unknown_resource_is_not_marked() {
        let f = fixture();
        let report = f.service.request_scan("404").unwrap();
        assert_eq!(report, UsageReport::unused());
        assert!(!f.service.cache().is_processed(id(404)).unwrap());
        assert!(f.service.cache().processed_ids().unwrap().is_empty());
    }

    #[test]
    fn test_request_scan_invalid_ids() {
        let f = fixture();
        for raw in ["0", "-12", "twelve", ""] {
            assert_eq!(f.service.request_scan(raw).unwrap(), UsageReport::unused());
        }
        assert_eq!(f.service.stats().scans, 0);
    }

    #[test]
    fn test_repeat_scan_is_identical_and_cached() {
        let f = fixture();
        let first = f.service.scan(id(12)).unwrap();
        let second = f.service.scan(id(12)).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(
            serde_json::to_string(&first.references).unwrap(),
            serde_json::to_string(&second.references).unwrap()
        );
        assert_eq!(f.service.stats().cache_hits, 1);
    }

    #[test]
    fn test_invalidation_round_trip() {
        let f = fixture();
        assert_eq!(f.service.scan(id(12)).unwrap().references.len(), 2);

        // Blog no longer embeds the image.
        f.site.upsert_entity(EntityEntry::new(2, "Blog"));
        let affected = f
            .service
            .invalidate_entity(&EntityKey::Entity(EntityId(2)))
            .unwrap();
        assert_eq!(affected, vec![id(12)]);

        let rescanned = f.service.scan(id(12)).unwrap();
        assert!(!rescanned.from_cache);
        assert_eq!(rescanned.references.len(), 1);
        assert_eq!(rescanned.references[0].label, "Home");
    }

    #[test]
    fn test_forward_invalidation_catches_new_embed() {
        let f = fixture();
        // Scanned while unused: processed marker only.
        assert!(f.service.can_delete(id(13)).unwrap());

        f.site.upsert_entity(
            EntityEntry::new(2, "Blog")
                .with_body("<img src=\"https://example.test/uploads/dog-150x150.jpg\">"),
        );
        let affected = f
            .service
            .invalidate_entity(&EntityKey::Entity(EntityId(2)))
            .unwrap();
        assert!(affected.contains(&id(13)));
        assert!(!f.service.cache().is_processed(id(13)).unwrap());
    }

    #[test]
    fn test_partial_scan_not_cached() {
        let f = fixture();
        f.site.set_outage(ReferenceKind::ContentEmbed, true);

        let outcome = f.service.scan(id(12)).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.references.len(), 1);
        assert!(f.service.cache().get(id(12)).unwrap().is_none());
        assert!(!f.service.cache().is_processed(id(12)).unwrap());

        f.site.set_outage(ReferenceKind::ContentEmbed, false);
        let outcome = f.service.scan(id(12)).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.references.len(), 2);
    }

    #[test]
    fn test_store_outage_surfaces() {
        let f = fixture();
        f.kv.set_available(false);
        let err = f.service.scan(id(12)).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_can_delete() {
        let f = fixture();
        assert!(!f.service.can_delete(id(12)).unwrap());
        assert!(f.service.can_delete(id(13)).unwrap());
    }

    #[test]
    fn test_apply_batch() {
        let f = fixture();
        f.service.scan(id(12)).unwrap();
        f.service.scan(id(13)).unwrap();

        let batch = MutationBatch::from_events([
            MutationEvent::Entity(EntityKey::Entity(EntityId(1))),
            MutationEvent::Entity(EntityKey::Entity(EntityId(1))),
            MutationEvent::Resource(id(13)),
            MutationEvent::Entity(EntityKey::Term(TermId(99))),
        ]);
        let outcome = f.service.apply(&batch).unwrap();
        assert_eq!(outcome.invalidated, vec![id(12), id(13)]);
    }

    #[test]
    fn test_report_snapshot() {
        let f = fixture();
        let report = f.service.report(id(12)).unwrap();
        insta::assert_json_snapshot!(report, @r#"
        {
          "used": true,
          "references": [
            {
              "kind": "featured_reference",
              "entity": {
                "bucket": "entity",
                "id": 1
              },
              "label": "Home"
            },
            {
              "kind": "content_embed",
              "entity": {
                "bucket": "entity",
                "id": 2
              },
              "label": "Blog"
            }
          ]
        }
        "#);
    }
}
