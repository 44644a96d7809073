//! Storage traits and error types
//!
//! This module defines the byte-level key/value interface shared by the page
//! cache and the run-history store, and associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
///
/// Every variant is fatal to a crawl run: without a working store no progress
/// can be recorded safely.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Deleted {deleted} keys, {} not confirmed: {unconfirmed:?}", .unconfirmed.len())]
    PartialDelete {
        deleted: usize,
        unconfirmed: Vec<String>,
    },
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for key/value storage backends
///
/// Any ordered or unordered key/value store satisfies this. Within one crawl
/// invocation a store is only written from the crawl task, so implementations
/// need no internal locking; serializing concurrent processes is left to the
/// underlying engine.
pub trait KeyValueStore: Send {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value
    fn put(&mut self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Deletes all `keys` in a single batch where the backend supports it
    ///
    /// # Returns
    ///
    /// The keys whose deletion was confirmed. Keys that were not present are
    /// not confirmed.
    fn delete_batch(&mut self, keys: &[String]) -> StorageResult<Vec<String>>;

    /// Visits every entry in the store
    ///
    /// The visitor may abort the scan by returning an error.
    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> StorageResult<()>) -> StorageResult<()>;

    /// Counts the entries in the store
    fn len(&self) -> StorageResult<u64> {
        let mut count = 0u64;
        self.scan(&mut |_, _| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
