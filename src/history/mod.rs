//! Run history tracking
//!
//! Every invocation appends one `RunRecord` to a single list stored under the
//! well-known key [`HISTORY_KEY`]. A dataset ("queue") is identified by its
//! `(url, fileName, year)` triple, never by position, because the number of
//! published datasets can change between runs.
//!
//! The history is append-only: older records are never rewritten or pruned,
//! so failed fetches of any past run can still be audited.

use crate::model::Level;
use crate::storage::{KeyValueStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Key under which the serialized run list is stored
pub const HISTORY_KEY: &str = "runHistory";

/// One page request made (or attempted) during a dataset crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub url: String,
    pub cache_key: String,
    /// Level of the records listed on the requested page
    pub level: Level,
    /// Name of the node whose listing was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// One dataset as discovered on the entry page, plus its crawl outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueRecord {
    pub url: String,
    pub last_modified: String,
    pub file_name: String,
    pub year: String,

    /// Crawl start, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,

    /// Crawl end, epoch milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_page_list: Option<Vec<PageRequest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_page_failed_list: Option<Vec<PageRequest>>,
}

impl QueueRecord {
    /// Creates a bare dataset record; the output file is named after the year
    pub fn new(url: impl Into<String>, last_modified: impl Into<String>, year: impl Into<String>) -> Self {
        let year = year.into();
        Self {
            url: url.into(),
            last_modified: last_modified.into(),
            file_name: format!("{}.json", year),
            year,
            start_time: None,
            end_time: None,
            request_page_list: None,
            request_page_failed_list: None,
        }
    }

    /// Whether `other` describes the same dataset
    pub fn same_dataset(&self, other: &QueueRecord) -> bool {
        self.url == other.url && self.file_name == other.file_name && self.year == other.year
    }

    /// Records the outcome of crawling this dataset
    pub fn record_outcome(
        &mut self,
        start_time: i64,
        end_time: i64,
        requested: Vec<PageRequest>,
        failed: Vec<PageRequest>,
    ) {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self.request_page_list = Some(requested);
        self.request_page_failed_list = Some(failed);
    }

    /// Returns a copy without any outcome fields
    pub fn bare(&self) -> Self {
        Self::new(self.url.clone(), self.last_modified.clone(), self.year.clone())
            .with_file_name(self.file_name.clone())
    }

    fn with_file_name(mut self, file_name: String) -> Self {
        self.file_name = file_name;
        self
    }
}

/// One invocation of the crawler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// Run start, epoch seconds
    pub run_date: i64,
    pub queues: Vec<QueueRecord>,
}

impl RunRecord {
    pub fn new(run_date: i64, queues: Vec<QueueRecord>) -> Self {
        Self { run_date, queues }
    }

    /// Finds this run's record of the same dataset as `queue`
    pub fn find_queue(&self, queue: &QueueRecord) -> Option<&QueueRecord> {
        self.queues.iter().find(|q| q.same_dataset(queue))
    }

    /// Finds this run's mutable record of the same dataset as `queue`
    pub fn find_queue_mut(&mut self, queue: &QueueRecord) -> Option<&mut QueueRecord> {
        self.queues.iter_mut().find(|q| q.same_dataset(queue))
    }
}

/// Loads, queries and appends to the run history
pub struct RunHistoryTracker<S: KeyValueStore> {
    store: S,
    history: Vec<RunRecord>,
}

impl<S: KeyValueStore> RunHistoryTracker<S> {
    /// Opens the tracker, loading the full history from `store`
    ///
    /// A missing history is an empty history. A history that exists but
    /// cannot be decoded is an error: writing over it would destroy records.
    pub fn open(store: S) -> StorageResult<Self> {
        let history = match store.get(HISTORY_KEY)? {
            None => Vec::new(),
            Some(bytes) => serde_json::from_slice::<Option<Vec<RunRecord>>>(&bytes)
                .map_err(|e| {
                    StorageError::Serialization(format!("run history is corrupt: {}", e))
                })?
                .unwrap_or_default(),
        };
        tracing::debug!("Loaded {} run records", history.len());
        Ok(Self { store, history })
    }

    /// All committed run records, in append order
    pub fn history(&self) -> &[RunRecord] {
        &self.history
    }

    /// Returns the most recent run by `runDate`
    ///
    /// On equal dates the later-appended record wins.
    pub fn load_latest(&self) -> Option<&RunRecord> {
        self.history.iter().max_by_key(|run| run.run_date)
    }

    /// Persists the committed history followed by the in-progress `current` run
    ///
    /// Only the tail entry changes between checkpoints of the same run.
    pub fn checkpoint(&mut self, current: &RunRecord) -> StorageResult<()> {
        let mut runs: Vec<&RunRecord> = self.history.iter().collect();
        runs.push(current);
        persist(&mut self.store, &runs)
    }

    /// Commits `record` to the history and persists the full list
    pub fn append_run(&mut self, record: RunRecord) -> StorageResult<()> {
        self.history.push(record);
        let runs: Vec<&RunRecord> = self.history.iter().collect();
        persist(&mut self.store, &runs)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Decides whether the cache may be trusted for `queue`
///
/// True iff `latest` holds a record of the same `(url, fileName, year)`
/// dataset whose `lastModified` equals the current one.
pub fn decide_trust(queue: &QueueRecord, latest: Option<&RunRecord>) -> bool {
    latest
        .and_then(|run| run.find_queue(queue))
        .map_or(false, |previous| previous.last_modified == queue.last_modified)
}

fn persist<S: KeyValueStore>(store: &mut S, runs: &[&RunRecord]) -> StorageResult<()> {
    let value = serde_json::to_vec(runs)?;
    store.put(HISTORY_KEY, &value)
}
