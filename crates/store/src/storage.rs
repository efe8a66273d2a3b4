//! Device-local persistence.
//!
//! Sessions and per-user mirrors survive process restarts through a small
//! key/value store. The production backend is one JSON file per key under
//! the configured data directory; tests use the in-memory variant.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors from device-local persistence.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem read or write failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be serialized or deserialized.
    #[error("storage serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Key/value persistence for device-local state.
///
/// Implementations must tolerate absent keys; `get` of a never-written key
/// returns `Ok(None)`.
pub trait DeviceStorage: Send + Sync {
    /// Read the raw value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing an absent key is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read and deserialize a JSON value stored under `key`.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the value fails to parse.
pub fn read_json<T: DeserializeOwned>(
    storage: &dyn DeviceStorage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<T: Serialize>(
    storage: &dyn DeviceStorage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    storage.set(key, &raw)
}

// =============================================================================
// JsonFileStorage
// =============================================================================

/// File-backed storage: one JSON file per key under a data directory.
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Create a file-backed store rooted at `dir`, creating the directory if
    /// it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DeviceStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Write-then-rename so a crash mid-write never truncates the old value.
        let path = self.path_for(key);
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        debug!(key, "persisted value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-memory storage for tests and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let storage = MemoryStorage::new();
        assert!(storage.get("missing").unwrap().is_none());

        storage.set("key", "value").unwrap();
        assert_eq!(storage.get("key").unwrap().as_deref(), Some("value"));

        storage.remove("key").unwrap();
        assert!(storage.get("key").unwrap().is_none());
    }

    #[test]
    fn test_memory_remove_absent_is_noop() {
        let storage = MemoryStorage::new();
        storage.remove("never-written").unwrap();
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        assert!(storage.get("session").unwrap().is_none());

        storage.set("session", r#"{"user": 1}"#).unwrap();
        assert_eq!(
            storage.get("session").unwrap().as_deref(),
            Some(r#"{"user": 1}"#)
        );

        storage.remove("session").unwrap();
        assert!(storage.get("session").unwrap().is_none());
    }

    #[test]
    fn test_file_overwrite_replaces_value() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path()).unwrap();

        storage.set("mirror.1", "old").unwrap();
        storage.set("mirror.1", "new").unwrap();
        assert_eq!(storage.get("mirror.1").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_json_helpers() {
        let storage = MemoryStorage::new();
        write_json(&storage, "numbers", &vec![1, 2, 3]).unwrap();

        let restored: Option<Vec<i32>> = read_json(&storage, "numbers").unwrap();
        assert_eq!(restored, Some(vec![1, 2, 3]));

        let missing: Option<Vec<i32>> = read_json(&storage, "missing").unwrap();
        assert!(missing.is_none());
    }
}
