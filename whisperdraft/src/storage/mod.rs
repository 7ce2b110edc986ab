//! Local key-value persistence.
//!
//! Values are JSON documents stored under namespaced keys. Reads treat a
//! missing or unreadable key as "use the default"; writes report success as
//! a boolean so callers decide whether a failure matters.

mod memory;
mod sqlite;

pub use memory::MemoryKvStore;
pub use sqlite::SqliteKvStore;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::error_log;

/// Namespaced keys used by the application.
pub mod keys {
    pub const NOTE_CURRENT: &str = "whisperdraft:note.current";
    pub const NOTE_BASE: &str = "whisperdraft:note.base";
    pub const NOTE_DIFF_QUEUE: &str = "whisperdraft:note.diffQueue";
    pub const CHAT_LOG: &str = "whisperdraft:chat.log";
    pub const SETTINGS: &str = "whisperdraft:settings";

    /// Keys that survive quota eviction.
    pub const ESSENTIAL: &[&str] = &[NOTE_CURRENT, NOTE_BASE, SETTINGS];
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded: {needed} bytes needed, limit {limit}")]
    QuotaExceeded { needed: usize, limit: usize },
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Backend(value.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

/// Raw string key-value backend.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Bytes an entry counts against a quota.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Fails when writing an entry of `incoming` bytes on top of `used` would
/// exceed `limit`.
pub(crate) fn check_quota(
    limit: Option<usize>,
    used: usize,
    incoming: usize,
) -> Result<(), StorageError> {
    match limit {
        Some(limit) if used + incoming > limit => Err(StorageError::QuotaExceeded {
            needed: used + incoming,
            limit,
        }),
        _ => Ok(()),
    }
}

/// JSON façade over a [`KvStore`].
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KvStore>,
}

impl Storage {
    pub fn new(backend: Arc<dyn KvStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!(key, "No stored value");
                return None;
            }
            Err(e) => {
                error_log::log_storage_error("Failed to read stored value", "get", &e, key);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                error_log::log_storage_error(
                    "Stored value is not valid JSON for its type",
                    "get",
                    &e,
                    key,
                );
                None
            }
        }
    }

    /// Serialize and store `value`. On quota errors, evicts non-essential
    /// keys and retries once.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error_log::log_storage_error("Failed to serialize value", "set", &e, key);
                return false;
            }
        };

        match self.backend.set(key, &raw) {
            Ok(()) => true,
            Err(StorageError::QuotaExceeded { needed, limit }) => {
                tracing::warn!(key, needed, limit, "Storage quota exceeded, evicting non-essential keys");
                self.evict_non_essential();
                match self.backend.set(key, &raw) {
                    Ok(()) => true,
                    Err(e) => {
                        error_log::log_storage_error(
                            "Write failed after eviction",
                            "set",
                            &e,
                            key,
                        );
                        false
                    }
                }
            }
            Err(e) => {
                error_log::log_storage_error("Failed to write value", "set", &e, key);
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => true,
            Err(e) => {
                error_log::log_storage_error("Failed to remove value", "remove", &e, key);
                false
            }
        }
    }

    pub fn clear(&self) -> bool {
        match self.backend.clear() {
            Ok(()) => true,
            Err(e) => {
                error_log::log_storage_error("Failed to clear storage", "clear", &e, "*");
                false
            }
        }
    }

    fn evict_non_essential(&self) {
        let stored = match self.backend.keys() {
            Ok(stored) => stored,
            Err(e) => {
                error_log::log_storage_error("Failed to list keys for eviction", "evict", &e, "*");
                return;
            }
        };

        for key in stored
            .iter()
            .filter(|key| !keys::ESSENTIAL.contains(&key.as_str()))
        {
            if self.remove(key) {
                tracing::info!(key = %key, "Removed non-essential item");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_json_round_trip_through_namespaced_key() {
        let storage = Storage::in_memory();
        let sample = Sample {
            name: "draft".to_string(),
            count: 3,
        };
        assert!(storage.set(keys::SETTINGS, &sample));
        assert_eq!(storage.get::<Sample>(keys::SETTINGS), Some(sample));
    }

    #[test]
    fn test_missing_key_reads_as_none() {
        let storage = Storage::in_memory();
        assert_eq!(storage.get::<String>(keys::NOTE_CURRENT), None);
    }

    #[test]
    fn test_corrupt_value_reads_as_none() {
        let backend = Arc::new(MemoryKvStore::new());
        backend.set(keys::CHAT_LOG, "{not json").unwrap();
        let storage = Storage::new(backend);
        assert_eq!(storage.get::<Vec<String>>(keys::CHAT_LOG), None);
    }

    #[test]
    fn test_quota_error_evicts_non_essential_keys_and_retries() {
        let backend = Arc::new(MemoryKvStore::with_quota(200));
        let storage = Storage::new(backend.clone());

        assert!(storage.set(keys::NOTE_BASE, "base"));
        assert!(storage.set(keys::CHAT_LOG, &"x".repeat(100)));

        // Does not fit next to the chat log, fits once it is evicted.
        assert!(storage.set(keys::NOTE_CURRENT, &"y".repeat(80)));

        assert_eq!(backend.get(keys::CHAT_LOG).unwrap(), None);
        assert!(backend.get(keys::NOTE_BASE).unwrap().is_some());
        assert!(backend.get(keys::NOTE_CURRENT).unwrap().is_some());
    }

    #[test]
    fn test_write_larger_than_quota_reports_failure() {
        let storage = Storage::new(Arc::new(MemoryKvStore::with_quota(16)));
        assert!(!storage.set(keys::NOTE_CURRENT, &"z".repeat(64)));
    }

    #[test]
    fn test_clear_removes_everything() {
        let storage = Storage::in_memory();
        storage.set(keys::NOTE_CURRENT, "a");
        storage.set(keys::SETTINGS, "b");
        assert!(storage.clear());
        assert_eq!(storage.get::<String>(keys::NOTE_CURRENT), None);
        assert_eq!(storage.get::<String>(keys::SETTINGS), None);
    }
}
