//! Persisted usage cache.
//!
//! [`UsageCache`] stores one [`UsageRecord`] per scanned resource in a
//! [`KeyValueStore`], alongside a "processed" marker and a reverse index
//! from referencing entity to resource ids.
//!
//! # Key Layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `{ns}:record:{resource}` | [`UsageRecord`] |
//! | `{ns}:processed:{resource}` | `true` |
//! | `{ns}:index:{bucket}:{entity}` | sorted array of resource ids |
//!
//! # Consistency
//!
//! The store only guarantees single-key atomicity, so a `put` is three
//! independent writes (record, index, marker). A reader may see a record
//! whose index entries are not written yet. Index entries are always
//! verified against the record before anything is purged, so a stale
//! index entry costs a lookup, never a wrong invalidation.
//!
//! Invalidation deletes the marker, then the record, then the index
//! entries. An index entry is only dropped once its record is gone, so an
//! invalidation interrupted by a store error can simply be retried.
//!
//! Reads always return owned values; nothing borrowed from the store
//! outlives a single call.

use std::collections::BTreeSet;
use std::sync::Arc;

use mu_core::{
    EntityKey, KeyValueStore, KeyValueStoreExt, ResourceId, StoreError, UsageRecord,
};
use tracing::{debug, warn};

/// Persisted per-resource cache of scan results.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use mu_core::{EntityId, EntityKey, MemoryKvStore, Reference, ResourceId, UsageRecord};
/// use mu_scanner::UsageCache;
///
/// let cache = UsageCache::new(Arc::new(MemoryKvStore::new()), "media_usage");
/// let id = ResourceId::new(12).unwrap();
///
/// cache.put(&UsageRecord::new(id, vec![Reference::featured(EntityId(3), "Home", None)]))?;
/// assert!(cache.get(id)?.is_some());
/// assert!(cache.is_processed(id)?);
///
/// let purged = cache.invalidate_referencing(&EntityKey::Entity(EntityId(3)))?;
/// assert_eq!(purged, vec![id]);
/// assert!(cache.get(id)?.is_none());
/// # Ok::<(), mu_core::StoreError>(())
/// ```
#[derive(Clone)]
pub struct UsageCache {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl std::fmt::Debug for UsageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageCache")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl UsageCache {
    /// Creates a cache writing under `namespace`.
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The namespace all keys are written under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn record_key(&self, id: ResourceId) -> String {
        format!("{}:record:{id}", self.namespace)
    }

    fn processed_prefix(&self) -> String {
        format!("{}:processed:", self.namespace)
    }

    fn processed_key(&self, id: ResourceId) -> String {
        format!("{}{id}", self.processed_prefix())
    }

    fn index_key(&self, entity: &EntityKey) -> String {
        format!("{}:index:{}", self.namespace, entity.storage_suffix())
    }

    /// Returns the cached record for `id`.
    ///
    /// A record that fails to decode is logged, deleted and reported as
    /// absent so the resource is rescanned.
    pub fn get(&self, id: ResourceId) -> Result<Option<UsageRecord>, StoreError> {
        let key = self.record_key(id);
        match self.store.get_json::<UsageRecord>(&key) {
            Ok(record) => Ok(record),
            Err(err) if err.is_corruption() => {
                warn!(resource = %id, error = %err, "dropping corrupt usage record");
                self.store.delete(&key)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Stores a record, indexes its entities and marks the resource processed.
    pub fn put(&self, record: &UsageRecord) -> Result<(), StoreError> {
        let id = record.resource_id;
        self.store.set_json(&self.record_key(id), record)?;

        let mut indexed = BTreeSet::new();
        for entity in record.entities() {
            if indexed.insert(entity) {
                self.update_index(entity, |ids| ids.insert(id))?;
            }
        }

        self.mark_processed(id)?;
        debug!(resource = %id, references = record.references.len(), "usage record cached");
        Ok(())
    }

    /// Marks `id` as scanned, whether or not references were found.
    pub fn mark_processed(&self, id: ResourceId) -> Result<(), StoreError> {
        self.store.set_json(&self.processed_key(id), &true)
    }

    /// Returns `true` if `id` was scanned since its last invalidation.
    pub fn is_processed(&self, id: ResourceId) -> Result<bool, StoreError> {
        Ok(self.store.get(&self.processed_key(id))?.is_some())
    }

    /// Every resource currently marked processed.
    pub fn processed_ids(&self) -> Result<Vec<ResourceId>, StoreError> {
        let prefix = self.processed_prefix();
        Ok(self
            .store
            .keys_with_prefix(&prefix)?
            .iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str()))
            .filter_map(ResourceId::parse)
            .collect())
    }

    /// Number of resources marked processed.
    pub fn processed_count(&self) -> Result<u64, StoreError> {
        Ok(self.processed_ids()?.len() as u64)
    }

    /// Removes the record and processed marker for `id`.
    ///
    /// Returns `true` if a record or marker was present.
    pub fn invalidate(&self, id: ResourceId) -> Result<bool, StoreError> {
        let record = self.get(id)?;
        let had_marker = self.store.delete(&self.processed_key(id))?;
        let had_record = self.store.delete(&self.record_key(id))?;
        if let Some(record) = record {
            let mut unindexed = BTreeSet::new();
            for entity in record.entities() {
                if unindexed.insert(entity) {
                    self.update_index(entity, |ids| ids.remove(&id))?;
                }
            }
        }
        if had_record || had_marker {
            debug!(resource = %id, "usage record invalidated");
        }
        Ok(had_record || had_marker)
    }

    /// Removes every record whose references include `entity`.
    ///
    /// Each candidate leaves the index only after its record is purged (or
    /// found not to cite `entity`), so a failed call leaves the remaining
    /// candidates indexed for the next attempt.
    ///
    /// Returns the purged resource ids in ascending order.
    pub fn invalidate_referencing(&self, entity: &EntityKey) -> Result<Vec<ResourceId>, StoreError> {
        let candidates = self.read_index(&self.index_key(entity))?;

        let mut purged = Vec::new();
        for id in candidates {
            let still_references = self
                .get(id)?
                .is_some_and(|record| record.references_entity(entity));
            if still_references {
                self.invalidate(id)?;
                purged.push(id);
            } else {
                self.update_index(entity, |ids| ids.remove(&id))?;
            }
        }
        debug!(%entity, purged = purged.len(), "invalidated referencing records");
        Ok(purged)
    }

    /// Removes every record, processed marker and index entry.
    ///
    /// Other keys under the namespace, such as job state, are left alone.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for section in ["record", "processed", "index"] {
            let keys = self
                .store
                .keys_with_prefix(&format!("{}:{section}:", self.namespace))?;
            for key in &keys {
                if self.store.delete(key)? {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    fn read_index(&self, key: &str) -> Result<BTreeSet<ResourceId>, StoreError> {
        match self.store.get_json::<BTreeSet<ResourceId>>(key) {
            Ok(ids) => Ok(ids.unwrap_or_default()),
            Err(err) if err.is_corruption() => {
                warn!(key, error = %err, "dropping corrupt reverse index entry");
                self.store.delete(key)?;
                Ok(BTreeSet::new())
            }
            Err(err) => Err(err),
        }
    }

    fn update_index(
        &self,
        entity: &EntityKey,
        change: impl FnOnce(&mut BTreeSet<ResourceId>) -> bool,
    ) -> Result<(), StoreError> {
        let key = self.index_key(entity);
        let mut ids = self.read_index(&key)?;
        if !change(&mut ids) {
            return Ok(());
        }
        if ids.is_empty() {
            self.store.delete(&key)?;
        } else {
            self.store.set_json(&key, &ids)?;
        }
        Ok(())
    }
}
