//! Key-value stores

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use voz_libro_core::{KeyValueStore, Result};

use crate::PersistenceError;

/// Process-local store
#[derive(Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (quota exceeded, private mode...)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Injected(format!("write to {key} rejected")).into());
        }
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a JSON object on disk
///
/// The whole map is kept in memory and rewritten on every `set`.
pub struct FileKeyValueStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open the store, starting empty when the file is missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match read_map(&path) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Ignoring unreadable key-value file");
                BTreeMap::new()
            }
        };

        tracing::debug!(path = %path.display(), keys = values.len(), "Key-value store opened");
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &BTreeMap<String, String>) -> std::result::Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn read_map(path: &Path) -> std::result::Result<BTreeMap<String, String>, PersistenceError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err.into()),
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.save(&values)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_roundtrip_and_failure() {
        let store = InMemoryKeyValueStore::new();
        assert!(store.get("voz").is_none());

        store.set("voz", "paulina").unwrap();
        assert_eq!(store.get("voz").as_deref(), Some("paulina"));

        store.set_fail_writes(true);
        assert!(store.set("voz", "monica").is_err());
        assert_eq!(store.get("voz").as_deref(), Some("paulina"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.json");

        let store = FileKeyValueStore::open(&path);
        store.set("voz-libro-voice", "es-mx-paulina").unwrap();

        let reopened = FileKeyValueStore::open(&path);
        assert_eq!(
            reopened.get("voz-libro-voice").as_deref(),
            Some("es-mx-paulina")
        );
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.json");
        fs::write(&path, "{not json").unwrap();

        let store = FileKeyValueStore::open(&path);
        assert!(store.get("anything").is_none());
        store.set("k", "v").unwrap();
        assert_eq!(FileKeyValueStore::open(&path).get("k").as_deref(), Some("v"));
    }
}
