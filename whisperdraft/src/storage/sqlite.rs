use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{check_quota, entry_size, KvStore, StorageError};

/// SQLite-backed key-value store.
///
/// Calls are synchronous and short; the connection sits behind a mutex so
/// the store can be shared across tasks.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
    quota: Option<usize>,
}

impl SqliteKvStore {
    /// Open (or create) the store at `path`. Use `":memory:"` for a
    /// throwaway database.
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                }
            }
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;

        tracing::info!(path, "Opened key-value store");
        Ok(Self {
            conn: Mutex::new(conn),
            quota: None,
        })
    }

    /// Reject writes once keys plus values exceed `bytes`.
    pub fn with_quota(mut self, bytes: Option<usize>) -> Self {
        self.quota = bytes;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection lock poisoned".to_string()))
    }
}

fn map_write_error(err: rusqlite::Error, incoming: usize) -> StorageError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DiskFull) | Some(ErrorCode::TooBig) => StorageError::QuotaExceeded {
            needed: incoming,
            limit: 0,
        },
        _ => StorageError::from(err),
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.lock()?;
        let incoming = entry_size(key, value);

        if self.quota.is_some() {
            let used: i64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0) FROM kv WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )?;
            check_quota(self.quota, used.max(0) as usize, incoming)?;
        }

        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )
        .map_err(|e| map_write_error(e, incoming))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key FROM kv ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.execute("DELETE FROM kv", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, Storage};
    use std::sync::Arc;

    #[test]
    fn test_values_survive_reopen() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("nested").join("whisperdraft.db");
        let db_path = db_path.to_str().expect("Invalid database path");

        {
            let store = SqliteKvStore::open(db_path).unwrap();
            store.set(keys::NOTE_CURRENT, "\"draft\"").unwrap();
        }

        let store = SqliteKvStore::open(db_path).unwrap();
        assert_eq!(
            store.get(keys::NOTE_CURRENT).unwrap().as_deref(),
            Some("\"draft\"")
        );
    }

    #[test]
    fn test_set_overwrites_existing_key() {
        let store = SqliteKvStore::open(":memory:").unwrap();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
        assert_eq!(store.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_quota_counts_other_keys_only() {
        let store = SqliteKvStore::open(":memory:")
            .unwrap()
            .with_quota(Some(10));
        store.set("a", "12345").unwrap();
        // Replacing the same key does not double count it.
        store.set("a", "67890").unwrap();
        let err = store.set("b", "12345").unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_storage_facade_evicts_on_sqlite_quota() {
        let store = SqliteKvStore::open(":memory:")
            .unwrap()
            .with_quota(Some(120));
        let storage = Storage::new(Arc::new(store));

        assert!(storage.set(keys::NOTE_DIFF_QUEUE, &"q".repeat(60)));
        assert!(storage.set(keys::NOTE_CURRENT, &"c".repeat(60)));
        assert_eq!(storage.get::<String>(keys::NOTE_DIFF_QUEUE), None);
        assert_eq!(storage.get::<String>(keys::NOTE_CURRENT), Some("c".repeat(60)));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteKvStore::open(":memory:").unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
