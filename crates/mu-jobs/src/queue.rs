//! The persisted job queue.
//!
//! Each entry lives under its own key, `<queue key>:<resource id>`, with the
//! id zero-padded so that key order is id order. Completing a unit deletes
//! one key, so a crash loses at most the unit in flight and draining the
//! queue never rewrites the entries still waiting.

use std::sync::Arc;

use mu_core::{JobQueueEntry, KeyValueStore, KeyValueStoreExt, ResourceId, StoreError};
use tracing::warn;

/// Ordered, persisted set of resources awaiting scan.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Creates a queue whose entries are stored under `key:`.
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let mut prefix = key.into();
        prefix.push(':');
        Self { store, prefix }
    }

    fn entry_key(&self, id: ResourceId) -> String {
        format!("{}{:020}", self.prefix, id.get())
    }

    fn entry_keys(&self) -> Result<Vec<String>, StoreError> {
        self.store.keys_with_prefix(&self.prefix)
    }

    /// Reads every entry in resource id order.
    pub fn load(&self) -> Result<Vec<JobQueueEntry>, StoreError> {
        self.peek_chunk(usize::MAX)
    }

    /// Replaces the queue contents.
    ///
    /// Entries for the same resource collapse into the first one.
    pub fn save(&self, entries: &[JobQueueEntry]) -> Result<(), StoreError> {
        self.clear()?;
        for entry in entries {
            let key = self.entry_key(entry.resource_id);
            if self.store.get(&key)?.is_none() {
                self.store.set_json(&key, entry)?;
            }
        }
        Ok(())
    }

    /// Number of queued entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entry_keys()?.len())
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.entry_keys()?.is_empty())
    }

    /// Returns up to `size` entries from the front without removing them.
    ///
    /// An entry that fails to decode is logged and the whole queue is
    /// dropped; the job has to be started again.
    pub fn peek_chunk(&self, size: usize) -> Result<Vec<JobQueueEntry>, StoreError> {
        let mut chunk = Vec::new();
        for key in self.entry_keys()?.into_iter().take(size) {
            match self.store.get_json::<JobQueueEntry>(&key) {
                Ok(Some(entry)) => chunk.push(entry),
                Ok(None) => {}
                Err(err) if err.is_corruption() => {
                    warn!(key = %key, error = %err, "job queue unreadable, treating as empty");
                    self.clear()?;
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(chunk)
    }

    /// Removes the entry for `id`. Returns `true` if one was queued.
    pub fn complete(&self, id: ResourceId) -> Result<bool, StoreError> {
        self.store.delete(&self.entry_key(id))
    }

    /// Drops every entry.
    pub fn clear(&self) -> Result<(), StoreError> {
        for key in self.entry_keys()? {
            self.store.delete(&key)?;
        }
        Ok(())
    }
}
