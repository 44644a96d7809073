//! Crawler coordinator - top-level run loop
//!
//! This module ties the pieces together for one invocation:
//! - Discovering the published datasets on the entry page
//! - Deciding per dataset whether the cache may be trusted
//! - Crawling each dataset depth-first
//! - Checkpointing the run record after every dataset
//! - Handing each finished tree to the dataset writer

use crate::cache::PageCache;
use crate::config::Config;
use crate::crawler::discovery::discover_datasets;
use crate::crawler::exceptions::SkipLevelTable;
use crate::crawler::extractor::Extractors;
use crate::crawler::fetcher::PageFetcher;
use crate::crawler::level::LevelCrawler;
use crate::history::{decide_trust, QueueRecord, RunHistoryTracker, RunRecord};
use crate::model::AdminNode;
use crate::output::{DatasetStats, DatasetWriter, JsonFileWriter, RunStatistics};
use crate::storage::{open_history_store, open_page_cache_store, KeyValueStore, SqliteStore};
use crate::{CrawlerError, Result};
use chrono::Utc;
use rand::Rng;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Per-invocation switches
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Never trust the cache, whatever the history says
    pub fresh: bool,

    /// Restrict the run to these release years; empty means all
    pub only_years: Vec<String>,
}

impl RunOptions {
    fn selects(&self, queue: &QueueRecord) -> bool {
        self.only_years.is_empty() || self.only_years.iter().any(|y| *y == queue.year)
    }
}

/// A discovered dataset and the trust decision for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPlan {
    pub queue: QueueRecord,
    pub use_cache: bool,
}

/// Main crawler coordinator structure
pub struct Coordinator<C: KeyValueStore, H: KeyValueStore> {
    config: Config,
    options: RunOptions,
    fetcher: PageFetcher,
    extractors: Extractors,
    exceptions: SkipLevelTable,
    cache: PageCache<C>,
    history: RunHistoryTracker<H>,
    writer: Box<dyn DatasetWriter>,
}

impl Coordinator<SqliteStore, SqliteStore> {
    /// Creates a coordinator backed by the configured SQLite database and
    /// JSON output directory
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage opened and HTTP client built
    /// * `Err(CrawlerError)` - The database or run history is unusable
    pub fn new(config: Config, options: RunOptions) -> Result<Self> {
        let db_path = Path::new(&config.storage.database_path);
        let cache_store = open_page_cache_store(db_path)?;
        let history_store = open_history_store(db_path)?;
        let writer = JsonFileWriter::new(&config.output.data_dir);

        Self::with_stores(config, options, cache_store, history_store, Box::new(writer))
    }
}

impl<C: KeyValueStore, H: KeyValueStore> Coordinator<C, H> {
    /// Creates a coordinator over arbitrary stores and writer
    pub fn with_stores(
        config: Config,
        options: RunOptions,
        cache_store: C,
        history_store: H,
        writer: Box<dyn DatasetWriter>,
    ) -> Result<Self> {
        let fetcher = PageFetcher::new(&config.crawler)?;
        let exceptions = SkipLevelTable::from_config(&config.skip_level);
        let history = RunHistoryTracker::open(history_store)?;

        tracing::debug!(
            "Coordinator ready: {} skip-level rules, {} past runs",
            exceptions.len(),
            history.history().len()
        );

        Ok(Self {
            config,
            options,
            fetcher,
            extractors: Extractors::stats_gov(),
            exceptions,
            cache: PageCache::new(cache_store),
            history,
            writer,
        })
    }

    pub fn history(&self) -> &RunHistoryTracker<H> {
        &self.history
    }

    /// Fetches the entry page and lists every published dataset
    ///
    /// The entry page is the one fetch whose failure is fatal: without it
    /// there is nothing to crawl.
    pub async fn discover(&self) -> Result<Vec<QueueRecord>> {
        let entry_url = &self.config.crawler.entry_url;
        let document = self.fetcher.fetch(entry_url).await?;

        let discovered = discover_datasets(&document);
        if discovered.is_empty() {
            return Err(CrawlerError::NoDatasets {
                url: entry_url.clone(),
            });
        }
        Ok(discovered)
    }

    /// Decides cache trust for each selected dataset against the latest
    /// committed run
    pub fn plan(&self, queues: &[QueueRecord]) -> Vec<DatasetPlan> {
        let latest = self.history.load_latest();
        let plans: Vec<DatasetPlan> = queues
            .iter()
            .filter(|queue| self.options.selects(queue))
            .map(|queue| DatasetPlan {
                queue: queue.clone(),
                use_cache: !self.options.fresh && decide_trust(queue, latest),
            })
            .collect();
        if plans.is_empty() {
            tracing::warn!("No discovered dataset matches {:?}", self.options.only_years);
        }
        plans
    }

    /// Builds the record of a new run over the discovered `queues`
    ///
    /// Selected datasets start bare. A dataset left out by `--only` keeps its
    /// entry from the latest run, publication date included, so skipping it
    /// does not change its trust decision next time. One that was never
    /// recorded stays out.
    pub fn start_record(&self, run_date: i64, queues: &[QueueRecord]) -> RunRecord {
        let latest = self.history.load_latest();
        let records = queues
            .iter()
            .filter_map(|queue| {
                if self.options.selects(queue) {
                    Some(queue.bare())
                } else {
                    latest
                        .and_then(|run| run.find_queue(queue))
                        .map(QueueRecord::bare)
                }
            })
            .collect();
        RunRecord::new(run_date, records)
    }

    /// Discovers and plans without crawling
    pub async fn preview(&self) -> Result<Vec<DatasetPlan>> {
        let queues = self.discover().await?;
        Ok(self.plan(&queues))
    }

    /// Runs one full crawl
    ///
    /// # Process
    ///
    /// 1. Discover datasets and decide trust for each selected one
    /// 2. Checkpoint the new run record with bare queues
    /// 3. Crawl each dataset, checkpointing its outcome as soon as it ends
    /// 4. Pause between datasets
    /// 5. Commit the run record to the history
    ///
    /// Only storage failures abort the run.
    pub async fn run(&mut self) -> Result<RunStatistics> {
        let run_date = Utc::now().timestamp();
        let queues = self.discover().await?;
        let plans = self.plan(&queues);

        let mut current = self.start_record(run_date, &queues);
        self.history.checkpoint(&current)?;

        tracing::info!("Run {}: {} datasets", run_date, plans.len());

        let mut stats = RunStatistics::new(run_date);
        for (index, plan) in plans.iter().enumerate() {
            if index > 0 {
                self.pause().await;
            }

            let span = tracing::info_span!("dataset", year = %plan.queue.year);
            let dataset = self
                .crawl_dataset(plan, &mut current)
                .instrument(span)
                .await?;
            stats.datasets.push(dataset);
        }

        self.history.append_run(current)?;
        tracing::info!(
            "Run {} complete: {} pages requested, {} failed",
            run_date,
            stats.total_requested(),
            stats.total_failed()
        );
        Ok(stats)
    }

    async fn crawl_dataset(
        &mut self,
        plan: &DatasetPlan,
        current: &mut RunRecord,
    ) -> Result<DatasetStats> {
        let queue = &plan.queue;
        tracing::info!(
            "Crawling {} (published {}), cache {}",
            queue.url,
            queue.last_modified,
            if plan.use_cache { "trusted" } else { "not trusted" }
        );

        let started = Instant::now();
        let start_time = Utc::now().timestamp_millis();

        let mut crawler = LevelCrawler::new(
            &self.fetcher,
            &mut self.cache,
            &self.extractors,
            &self.exceptions,
            plan.use_cache,
        );
        let tree = crawler.crawl(&queue.url).await?;
        let log = crawler.into_log();

        let end_time = Utc::now().timestamp_millis();
        let stats = DatasetStats {
            year: queue.year.clone(),
            file_name: queue.file_name.clone(),
            use_cache: plan.use_cache,
            nodes: tree.iter().map(AdminNode::count).sum(),
            requested: log.requested.len(),
            failed: log.failed.len(),
            elapsed_ms: end_time - start_time,
        };

        if let Some(record) = current.find_queue_mut(queue) {
            record.record_outcome(start_time, end_time, log.requested, log.failed);
        }
        self.history.checkpoint(current)?;

        // Outcome is recorded even when the file write fails
        if let Err(e) = self.writer.write_dataset(&queue.file_name, &tree) {
            tracing::error!("Failed to write {}: {}", queue.file_name, e);
        }

        tracing::info!(
            "Finished {}: {} nodes, {} pages requested, {} failed in {:?}",
            queue.year,
            stats.nodes,
            stats.requested,
            stats.failed,
            started.elapsed()
        );
        Ok(stats)
    }

    async fn pause(&self) {
        let [min, max] = self.config.crawler.dataset_pause_ms;
        let millis = rand::thread_rng().gen_range(min..=max);
        if millis > 0 {
            tracing::debug!("Pausing {}ms before next dataset", millis);
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }
}
