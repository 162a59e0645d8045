use std::io::ErrorKind;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::KeyValueStore;
use crate::error::StoreError;

const VALUE_SUFFIX: &str = ".kv";
const TMP_SUFFIX: &str = ".tmp";

/// A [`KeyValueStore`] persisted as one file per key inside a directory.
///
/// Each key maps to `<dir>/<percent-encoded key>.kv`, so a write touches
/// only that key's file and separate processes (a detached worker and a
/// short-lived progress query, say) observe each other's writes. Writes
/// go to a sibling temporary file which is then renamed over the value
/// file, so readers never see a half-written value.
///
/// Within one process writes are serialized by a mutex. Across processes
/// the store offers no more than last-writer-wins per key.
///
/// A missing directory reads as an empty store.
#[derive(Debug)]
pub struct FileKvStore {
    dir: Utf8PathBuf,
    lock: Mutex<()>,
}

impl FileKvStore {
    /// Opens (or creates) a store rooted at `dir`.
    pub fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        debug!(dir = %dir, "file store opened");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// The backing directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> Utf8PathBuf {
        self.dir.join(format!("{}{VALUE_SUFFIX}", urlencoding::encode(key)))
    }

    fn read_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(encoded) = name.to_str().and_then(|n| n.strip_suffix(VALUE_SUFFIX)) else {
                continue;
            };
            match urlencoding::decode(encoded) {
                Ok(key) => keys.push(key.into_owned()),
                Err(_) => warn!(file = ?name, "skipping undecodable store file"),
            }
        }
        Ok(keys)
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.value_path(key);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        std::fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let path = self.value_path(key);
        let tmp = Utf8PathBuf::from(format!("{path}.{}{TMP_SUFFIX}", std::process::id()));
        std::fs::write(&tmp, value).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StoreError::io(&path, e))
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock();
        let path = self.value_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys: Vec<String> = self
            .read_keys()?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort_unstable();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileKvStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("state/mu")).unwrap();
        let store = FileKvStore::open(path).unwrap();
        (dir, store)
    }

    #[test]
    fn test_empty_store() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get("anything").unwrap(), None);
        assert!(store.keys_with_prefix("").unwrap().is_empty());
        assert!(!store.delete("anything").unwrap());
    }

    #[test]
    fn test_writes_are_visible_to_a_second_handle() {
        let (_dir, store) = temp_store();
        store.set("jobs:state", "\"running\"".to_owned()).unwrap();

        let other = FileKvStore::open(store.dir().to_owned()).unwrap();
        assert_eq!(other.get("jobs:state").unwrap().as_deref(), Some("\"running\""));

        other.delete("jobs:state").unwrap();
        assert_eq!(store.get("jobs:state").unwrap(), None);
    }

    #[test]
    fn test_prefix_listing() {
        let (_dir, store) = temp_store();
        store.set("a:2", "2".to_owned()).unwrap();
        store.set("a:1", "1".to_owned()).unwrap();
        store.set("b:1", "3".to_owned()).unwrap();
        assert_eq!(store.keys_with_prefix("a:").unwrap(), vec!["a:1", "a:2"]);
    }

    #[test]
    fn test_each_key_has_its_own_file() {
        let (_dir, store) = temp_store();
        store.set("jobs:queue:1", "{}".to_owned()).unwrap();
        store.set("jobs:queue:2", "{}".to_owned()).unwrap();

        let files = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(files, 2);

        let before = std::fs::read_to_string(store.value_path("jobs:queue:2")).unwrap();
        assert!(store.delete("jobs:queue:1").unwrap());
        let after = std::fs::read_to_string(store.value_path("jobs:queue:2")).unwrap();
        assert_eq!(before, after);
        assert_eq!(std::fs::read_dir(store.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_keys_with_path_characters() {
        let (_dir, store) = temp_store();
        let key = "record:../../etc/passwd %2F";
        store.set(key, "x".to_owned()).unwrap();
        assert_eq!(store.get(key).unwrap().as_deref(), Some("x"));
        assert_eq!(store.keys_with_prefix("record:").unwrap(), vec![key]);
    }

    #[test]
    fn test_leftover_tmp_files_are_ignored() {
        let (_dir, store) = temp_store();
        store.set("k", "v".to_owned()).unwrap();
        std::fs::write(store.dir().join("k.kv.99.tmp"), "partial").unwrap();
        assert_eq!(store.keys_with_prefix("").unwrap(), vec!["k"]);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
