//! Storage module for persisting crawl data
//!
//! This module handles all persistence for the crawler:
//! - The `KeyValueStore` interface shared by the page cache and run history
//! - A SQLite backend with bucketed keys
//! - An in-memory backend for tests

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, StorageError, StorageResult};

use std::path::Path;

/// Bucket holding page-cache entries
pub const PAGE_CACHE_BUCKET: &str = "page_cache";

/// Bucket holding the run-history record list
pub const RUN_HISTORY_BUCKET: &str = "run_history";

/// Opens the page-cache store inside the database at `path`
pub fn open_page_cache_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path, PAGE_CACHE_BUCKET)
}

/// Opens the run-history store inside the database at `path`
pub fn open_history_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path, RUN_HISTORY_BUCKET)
}
