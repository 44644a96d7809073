//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the KeyValueStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{KeyValueStore, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// SQLite key/value backend scoped to one bucket
///
/// Several stores may share one database file, each with its own bucket.
pub struct SqliteStore {
    conn: Connection,
    bucket: String,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` scoped to `bucket`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    /// * `bucket` - Namespace for all keys written through this handle
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path, bucket: &str) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        // Another crawl invocation may hold the write lock
        conn.busy_timeout(Duration::from_secs(10))?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn,
            bucket: bucket.to_string(),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory(bucket: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn,
            bucket: bucket.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_entries WHERE bucket = ?1 AND key = ?2",
                params![self.bucket, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_entries (bucket, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bucket, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![self.bucket, key, value, now],
        )?;
        Ok(())
    }

    fn delete_batch(&mut self, keys: &[String]) -> StorageResult<Vec<String>> {
        let tx = self.conn.transaction()?;
        let mut confirmed = Vec::with_capacity(keys.len());
        {
            let mut stmt = tx.prepare("DELETE FROM kv_entries WHERE bucket = ?1 AND key = ?2")?;
            for key in keys {
                if stmt.execute(params![self.bucket, key])? > 0 {
                    confirmed.push(key.clone());
                }
            }
        }
        tx.commit()?;
        Ok(confirmed)
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> StorageResult<()>) -> StorageResult<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv_entries WHERE bucket = ?1 ORDER BY key")?;
        let mut rows = stmt.query(params![self.bucket])?;
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(&key, &value)?;
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM kv_entries WHERE bucket = ?1",
            params![self.bucket],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_in_memory() {
        let store = SqliteStore::new_in_memory("page_cache");
        assert!(store.is_ok());
    }

    #[test]
    fn test_put_and_get() {
        let mut store = SqliteStore::new_in_memory("page_cache").unwrap();
        store.put("k1", b"[1]").unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(b"[1]".to_vec()));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_put_replaces_existing() {
        let mut store = SqliteStore::new_in_memory("page_cache").unwrap();
        store.put("k1", b"old").unwrap();
        store.put("k1", b"new").unwrap();
        assert_eq!(store.get("k1").unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_delete_batch_confirms_only_present_keys() {
        let mut store = SqliteStore::new_in_memory("page_cache").unwrap();
        store.put("a", b"1").unwrap();
        store.put("b", b"2").unwrap();

        let confirmed = store
            .delete_batch(&["a".to_string(), "ghost".to_string()])
            .unwrap();

        assert_eq!(confirmed, vec!["a".to_string()]);
        assert_eq!(store.get("a").unwrap(), None);
        assert!(store.get("b").unwrap().is_some());
    }

    #[test]
    fn test_scan_visits_all_in_key_order() {
        let mut store = SqliteStore::new_in_memory("page_cache").unwrap();
        store.put("b", b"2").unwrap();
        store.put("a", b"1").unwrap();

        let mut seen = Vec::new();
        store
            .scan(&mut |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            seen,
            vec![("a".to_string(), b"1".to_vec()), ("b".to_string(), b"2".to_vec())]
        );
    }

    #[test]
    fn test_buckets_are_isolated_in_one_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.sqlite");

        let mut cache = SqliteStore::new(&path, "page_cache").unwrap();
        let mut history = SqliteStore::new(&path, "run_history").unwrap();

        cache.put("runHistory", b"cache-side").unwrap();
        history.put("runHistory", b"history-side").unwrap();

        assert_eq!(cache.get("runHistory").unwrap(), Some(b"cache-side".to_vec()));
        assert_eq!(history.get("runHistory").unwrap(), Some(b"history-side".to_vec()));
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(history.bucket(), "run_history");
    }

    #[test]
    fn test_reopen_persists_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");

        {
            let mut store = SqliteStore::new(&path, "page_cache").unwrap();
            store.put("k", b"v").unwrap();
        }

        let store = SqliteStore::new(&path, "page_cache").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
    }
}
