//! Offline cleanup of invalid page-cache entries
//!
//! The janitor runs in two strictly separated phases. The scan phase reads
//! every entry and classifies it without mutating anything; only after the
//! full key lists have been produced (and audited) does the purge phase
//! delete. An interrupted run therefore never deletes based on partial
//! information.

use crate::cache::{decode_child_list, PageCache};
use crate::storage::{KeyValueStore, StorageError, StorageResult};

/// Result of the read-only scan phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Every key seen, in store order
    pub all_keys: Vec<String>,
    pub valid_keys: Vec<String>,
    /// Keys whose value is undecodable, null or empty
    pub invalid_keys: Vec<String>,
}

/// Result of the purge phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub deleted: usize,
    /// Keys that could not be confirmed deleted
    pub failed: Vec<String>,
}

/// Combined result of a scan, audit and purge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub scan: ScanReport,
    pub purge: PurgeReport,
}

/// Finds and removes invalid page-cache entries
pub struct CacheJanitor<'a, S: KeyValueStore> {
    cache: &'a mut PageCache<S>,
}

impl<'a, S: KeyValueStore> CacheJanitor<'a, S> {
    pub fn new(cache: &'a mut PageCache<S>) -> Self {
        Self { cache }
    }

    /// Reads every entry and classifies it as valid or invalid
    pub fn scan(&self) -> StorageResult<ScanReport> {
        let mut report = ScanReport::default();

        self.cache.store().scan(&mut |key, value| {
            report.all_keys.push(key.to_string());
            match decode_child_list(value) {
                Ok(_) => report.valid_keys.push(key.to_string()),
                Err(e) => {
                    tracing::debug!("Invalid cache entry {}: {}", key, e);
                    report.invalid_keys.push(key.to_string());
                }
            }
            if report.all_keys.len() % 10_000 == 0 {
                tracing::info!("Scanned {} cache entries", report.all_keys.len());
            }
            Ok(())
        })?;

        tracing::info!(
            "Scan complete: {} entries, {} invalid",
            report.all_keys.len(),
            report.invalid_keys.len()
        );
        Ok(report)
    }

    /// Deletes the given keys, best effort
    ///
    /// A batched delete is attempted first. If the batch itself fails, each
    /// key is retried on its own so one bad key cannot block the others.
    pub fn purge(&mut self, invalid_keys: &[String]) -> PurgeReport {
        match self.cache.delete_invalid(invalid_keys) {
            Ok(deleted) => PurgeReport {
                deleted,
                failed: Vec::new(),
            },
            Err(StorageError::PartialDelete {
                deleted,
                unconfirmed,
            }) => {
                tracing::warn!("{} cache keys were not confirmed deleted", unconfirmed.len());
                PurgeReport {
                    deleted,
                    failed: unconfirmed,
                }
            }
            Err(e) => {
                tracing::warn!("Batch delete failed ({}), deleting keys one by one", e);
                self.purge_individually(invalid_keys)
            }
        }
    }

    fn purge_individually(&mut self, keys: &[String]) -> PurgeReport {
        let mut report = PurgeReport::default();
        for key in keys {
            match self.cache.store_mut().delete_batch(std::slice::from_ref(key)) {
                Ok(confirmed) if !confirmed.is_empty() => report.deleted += 1,
                Ok(_) => report.failed.push(key.clone()),
                Err(e) => {
                    tracing::warn!("Failed to delete cache key {}: {}", key, e);
                    report.failed.push(key.clone());
                }
            }
        }
        report
    }

    /// Runs scan, audit and purge in order
    ///
    /// `audit` receives the complete scan report before anything is deleted.
    /// If it fails, nothing is purged and its error is returned.
    pub fn clean<E, F>(&mut self, audit: F) -> Result<CleanReport, E>
    where
        E: From<StorageError>,
        F: FnOnce(&ScanReport) -> Result<(), E>,
    {
        let scan = self.scan()?;
        audit(&scan)?;
        let purge = self.purge(&scan.invalid_keys);
        tracing::info!(
            "Purged {} invalid cache entries ({} failed)",
            purge.deleted,
            purge.failed.len()
        );
        Ok(CleanReport { scan, purge })
    }
}
