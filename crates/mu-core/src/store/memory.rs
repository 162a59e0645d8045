use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::KeyValueStore;
use crate::error::StoreError;

/// An in-process [`KeyValueStore`].
///
/// Every method takes the lock for a single operation and never hands out
/// references into the map. [`set_available`](Self::set_available) simulates
/// a storage outage: while unavailable every operation fails with
/// [`StoreError::Unavailable`].
///
/// # Examples
///
/// ```
/// use mu_core::{KeyValueStore, MemoryKvStore};
///
/// let store = MemoryKvStore::new();
/// store.set("a", "1".to_owned()).unwrap();
/// assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
///
/// store.set_available(false);
/// assert!(store.get("a").is_err());
/// ```
#[derive(Debug)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
    available: AtomicBool,
}

impl Default for MemoryKvStore {
    fn default() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl MemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns the simulated outage off (`true`) or on (`false`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory store switched off"))
        }
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check()?;
        self.entries.write().insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.entries.write().remove(key).is_some())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        Ok(self
            .entries
            .read()
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
