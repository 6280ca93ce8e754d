//! Durable local mirror of the cart and wishlist.
//!
//! Persistence is injected through [`CartPersistence`] so the store can be
//! exercised without a real storage backend. Records are the cart, the
//! wishlist and the session marker. Each is written whole on every change.
//!
//! # Record layout
//!
//! ```json
//! { "version": 1, "saved_at": "2026-01-01T00:00:00Z", "items": { "<id>": { ... } } }
//! ```
//!
//! Readers also accept the legacy bare array/map layout; every entry goes
//! through the normalizer on the way in.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Current record format version.
pub const RECORD_VERSION: u32 = 1;

/// Errors from the persistence backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend refused the write.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Which durable record to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Record {
    Cart,
    Wishlist,
    /// Which session the cart was last reconciled for.
    Session,
}

impl Record {
    /// File name used by file-backed storage.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Cart => "cart.json",
            Self::Wishlist => "wishlist.json",
            Self::Session => "session.json",
        }
    }
}

/// Load/save contract for the durable mirror.
///
/// `save` must be atomic with respect to `load`: a reader sees either the
/// previous record or the new one, never a partial write.
pub trait CartPersistence: Send + Sync {
    /// Read a record. `Ok(None)` means it has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read or parsed.
    fn load(&self, record: Record) -> Result<Option<Value>, StorageError>;

    /// Replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save(&self, record: Record, value: &Value) -> Result<(), StorageError>;

    /// Delete a record; no-op when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be deleted.
    fn remove(&self, record: Record) -> Result<(), StorageError>;
}

/// Versioned envelope around a persisted item map.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordEnvelope<T> {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub items: T,
}

impl<T: Serialize> RecordEnvelope<T> {
    /// Wrap `items` with the current version and time.
    pub fn new(items: T) -> Self {
        Self {
            version: RECORD_VERSION,
            saved_at: Utc::now(),
            items,
        }
    }

    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if `items` cannot be serialized.
    pub fn to_value(&self) -> Result<Value, StorageError> {
        Ok(serde_json::to_value(self)?)
    }
}

// =============================================================================
// JsonFileStorage
// =============================================================================

/// One JSON file per record in a directory, replaced by atomic rename.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Use `dir` for records. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the records.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, record: Record) -> PathBuf {
        self.dir.join(record.file_name())
    }
}

impl CartPersistence for JsonFileStorage {
    fn load(&self, record: Record) -> Result<Option<Value>, StorageError> {
        let path = self.path(record);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, record: Record, value: &Value) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(record);
        let serialized = serde_json::to_vec_pretty(value)?;

        // Temp file in the same directory so the rename stays on one filesystem
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        temp.write_all(&serialized)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|source| StorageError::Io {
                path: temp.path().to_path_buf(),
                source,
            })?;
        temp.persist(&path).map_err(|e| StorageError::Io {
            path: path.clone(),
            source: e.error,
        })?;

        tracing::trace!(path = %path.display(), bytes = serialized.len(), "Record saved");
        Ok(())
    }

    fn remove(&self, record: Record) -> Result<(), StorageError> {
        let path = self.path(record);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-process storage, for tests and hosts without a disk.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: Mutex<HashMap<Record, Value>>,
    fail_saves: Mutex<bool>,
}

impl MemoryStorage {
    /// Create empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a record.
    #[must_use]
    pub fn with_record(self, record: Record, value: Value) -> Self {
        self.records.lock().insert(record, value);
        self
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    /// Current raw contents of a record.
    #[must_use]
    pub fn raw(&self, record: Record) -> Option<Value> {
        self.records.lock().get(&record).cloned()
    }
}

impl CartPersistence for MemoryStorage {
    fn load(&self, record: Record) -> Result<Option<Value>, StorageError> {
        Ok(self.raw(record))
    }

    fn save(&self, record: Record, value: &Value) -> Result<(), StorageError> {
        if *self.fail_saves.lock() {
            return Err(StorageError::Unavailable("saves disabled".to_string()));
        }
        self.records.lock().insert(record, value.clone());
        Ok(())
    }

    fn remove(&self, record: Record) -> Result<(), StorageError> {
        if *self.fail_saves.lock() {
            return Err(StorageError::Unavailable("saves disabled".to_string()));
        }
        self.records.lock().remove(&record);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_file_storage_missing_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path());
        assert!(storage.load(Record::Cart).unwrap().is_none());
    }

    #[test]
    fn test_file_storage_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path().join("nested"));
        let value = json!({"version": 1, "items": {"a": {"title": "A"}}});

        storage.save(Record::Cart, &value).unwrap();
        assert_eq!(storage.load(Record::Cart).unwrap(), Some(value));
        assert!(storage.load(Record::Wishlist).unwrap().is_none());
    }

    #[test]
    fn test_file_storage_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path());
        storage.save(Record::Cart, &json!([1])).unwrap();
        storage.save(Record::Cart, &json!([2])).unwrap();

        assert_eq!(storage.load(Record::Cart).unwrap(), Some(json!([2])));
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_file_storage_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::new(dir.path());
        storage.remove(Record::Session).unwrap();

        storage.save(Record::Session, &json!({})).unwrap();
        assert!(dir.path().join("session.json").exists());
        storage.remove(Record::Session).unwrap();
        assert!(storage.load(Record::Session).unwrap().is_none());
    }

    #[test]
    fn test_file_storage_corrupt_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cart.json"), "{not json").unwrap();
        let storage = JsonFileStorage::new(dir.path());
        assert!(matches!(
            storage.load(Record::Cart),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn test_memory_storage_failing_saves() {
        let storage = MemoryStorage::new();
        storage.set_fail_saves(true);
        assert!(storage.save(Record::Cart, &json!([])).is_err());
        storage.set_fail_saves(false);
        storage.save(Record::Cart, &json!([])).unwrap();
        assert_eq!(storage.raw(Record::Cart), Some(json!([])));
    }

    #[test]
    fn test_envelope_shape() {
        let value = RecordEnvelope::new(json!({})).to_value().unwrap();
        assert_eq!(value["version"], json!(RECORD_VERSION));
        assert!(value["saved_at"].is_string());
    }
}
