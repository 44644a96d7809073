//! In-memory storage implementation
//!
//! Used by tests and by callers that want a throwaway cache.

use crate::storage::traits::{KeyValueStore, StorageResult};
use std::collections::BTreeMap;

/// Ordered in-memory key/value store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete_batch(&mut self, keys: &[String]) -> StorageResult<Vec<String>> {
        Ok(keys
            .iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .cloned()
            .collect())
    }

    fn scan(&self, visit: &mut dyn FnMut(&str, &[u8]) -> StorageResult<()>) -> StorageResult<()> {
        for (key, value) in &self.entries {
            visit(key, value)?;
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.entries.len() as u64)
    }
}
