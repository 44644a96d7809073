//! Content-addressed page cache
//!
//! Each child-listing page's extracted records are stored under a SHA-256
//! digest of the exact URL string. The cache never expires entries by itself;
//! staleness is governed per dataset by the run history, and invalid entries
//! are only ever removed by the `CacheJanitor`.
//!
//! # Read contract
//!
//! A stored value that fails to decode, decodes to `null`, or decodes to an
//! empty array is reported as a miss. Callers rely on this to tell "never
//! successfully determined" apart from real data, so an empty list is never
//! returned from [`PageCache::get`].

mod janitor;

pub use janitor::{CacheJanitor, CleanReport, PurgeReport, ScanReport};

use crate::model::ChildRecord;
use crate::storage::{KeyValueStore, StorageError, StorageResult};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reasons a stored cache value is unusable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheDecodeError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("value is null")]
    Null,

    #[error("value is an empty list")]
    Empty,
}

/// Derives the cache key for a URL
///
/// The key is a hash of the exact URL string, so URLs differing only in query
/// parameters are distinct keys.
pub fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Decodes a stored value into a non-empty child list
pub fn decode_child_list(bytes: &[u8]) -> Result<Vec<ChildRecord>, CacheDecodeError> {
    let decoded: Option<Vec<ChildRecord>> = serde_json::from_slice(bytes)
        .map_err(|e| CacheDecodeError::InvalidJson(e.to_string()))?;
    match decoded {
        None => Err(CacheDecodeError::Null),
        Some(list) if list.is_empty() => Err(CacheDecodeError::Empty),
        Some(list) => Ok(list),
    }
}

/// Page cache over any key/value store
pub struct PageCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> PageCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Looks up the cached child list for `url`
    ///
    /// # Returns
    ///
    /// * `Ok(Some(list))` - A valid, non-empty cached list
    /// * `Ok(None)` - Miss: absent, undecodable, null or empty
    /// * `Err(StorageError)` - The store itself failed
    pub fn get(&self, url: &str) -> StorageResult<Option<Vec<ChildRecord>>> {
        let key = cache_key(url);
        let Some(bytes) = self.store.get(&key)? else {
            return Ok(None);
        };

        match decode_child_list(&bytes) {
            Ok(list) => {
                tracing::debug!("Read {} from cache ({} records)", url, list.len());
                Ok(Some(list))
            }
            Err(e) => {
                tracing::warn!("Ignoring cache entry {} for {}: {}", key, url, e);
                Ok(None)
            }
        }
    }

    /// Stores the child list for `url`
    ///
    /// Empty lists are never written, so a transient zero-result page cannot
    /// poison the cache.
    ///
    /// # Returns
    ///
    /// Whether anything was written
    pub fn put(&mut self, url: &str, children: &[ChildRecord]) -> StorageResult<bool> {
        if children.is_empty() {
            return Ok(false);
        }
        let value = serde_json::to_vec(children)?;
        self.store.put(&cache_key(url), &value)?;
        Ok(true)
    }

    /// Deletes the given cache keys in one batch
    ///
    /// # Returns
    ///
    /// * `Ok(count)` - Every key was confirmed deleted
    /// * `Err(StorageError::PartialDelete)` - Some keys were not confirmed
    pub fn delete_invalid(&mut self, keys: &[String]) -> StorageResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let confirmed = self.store.delete_batch(keys)?;
        if confirmed.len() == keys.len() {
            return Ok(confirmed.len());
        }

        let unconfirmed = keys
            .iter()
            .filter(|key| !confirmed.contains(key))
            .cloned()
            .collect();
        Err(StorageError::PartialDelete {
            deleted: confirmed.len(),
            unconfirmed,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}
