//! Persisted key/value storage.
//!
//! Usage records, processed markers, the job queue, progress counters and
//! the cancellation flag all live behind [`KeyValueStore`]. The only
//! guarantee assumed of an implementation is single-key atomicity:
//! there are no transactions, so multi-key updates may be observed halfway.
//!
//! Values are JSON strings. [`KeyValueStoreExt`] adds typed accessors on top.
//!
//! # Implementations
//!
//! - [`MemoryKvStore`] - in-process map, with an availability switch for tests
//! - [`FileKvStore`] - one file per key in a directory, shareable between
//!   processes

mod file;
mod memory;

pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// Raw key/value storage with single-key atomic operations.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Removes `key`. Returns `true` if it was present.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Lists every key starting with `prefix`, in sorted order.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Typed JSON accessors for any [`KeyValueStore`].
///
/// # Examples
///
/// ```
/// use mu_core::{KeyValueStoreExt, MemoryKvStore, ProgressState};
///
/// let store = MemoryKvStore::new();
/// store.set_json("jobs:progress", &ProgressState::new(3)).unwrap();
///
/// let progress: Option<ProgressState> = store.get_json("jobs:progress").unwrap();
/// assert_eq!(progress.map(|p| p.total), Some(3));
/// ```
pub trait KeyValueStoreExt: KeyValueStore {
    /// Reads and decodes the value under `key`.
    ///
    /// A value that fails to decode yields [`StoreError::Corrupt`].
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::corrupt(key, source)),
            None => Ok(None),
        }
    }

    /// Encodes and stores `value` under `key`.
    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_owned(),
            source,
        })?;
        self.set(key, raw)
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
