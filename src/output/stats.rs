//! Crawl statistics
//!
//! Per-dataset and per-run counters, built either live by the coordinator or
//! after the fact from a stored run record.

use crate::history::{QueueRecord, RunRecord};
use chrono::{TimeZone, Utc};

/// Counters for one dataset crawl
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetStats {
    pub year: String,
    pub file_name: String,

    /// Whether the cache was trusted for this dataset
    pub use_cache: bool,

    /// Nodes in the assembled tree; zero when rebuilt from history
    pub nodes: usize,

    /// Pages fetched and extracted
    pub requested: usize,

    /// Pages that failed
    pub failed: usize,

    pub elapsed_ms: i64,
}

impl DatasetStats {
    /// Builds counters from a finished queue record
    pub fn from_queue(queue: &QueueRecord) -> Self {
        let elapsed_ms = match (queue.start_time, queue.end_time) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        };
        Self {
            year: queue.year.clone(),
            file_name: queue.file_name.clone(),
            use_cache: false,
            nodes: 0,
            requested: queue.request_page_list.as_ref().map_or(0, Vec::len),
            failed: queue.request_page_failed_list.as_ref().map_or(0, Vec::len),
            elapsed_ms,
        }
    }

    /// Share of fetched pages that succeeded, as a percentage
    pub fn success_rate(&self) -> f64 {
        let total = self.requested + self.failed;
        if total == 0 {
            return 100.0;
        }
        (self.requested as f64 / total as f64) * 100.0
    }
}

/// Counters for one crawler invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatistics {
    /// Run start, epoch seconds
    pub run_date: i64,
    pub datasets: Vec<DatasetStats>,
}

impl RunStatistics {
    pub fn new(run_date: i64) -> Self {
        Self {
            run_date,
            datasets: Vec::new(),
        }
    }

    /// Rebuilds counters for a stored run; datasets never crawled are skipped
    pub fn from_record(record: &RunRecord) -> Self {
        Self {
            run_date: record.run_date,
            datasets: record
                .queues
                .iter()
                .filter(|q| q.end_time.is_some())
                .map(DatasetStats::from_queue)
                .collect(),
        }
    }

    pub fn total_requested(&self) -> usize {
        self.datasets.iter().map(|d| d.requested).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.datasets.iter().map(|d| d.failed).sum()
    }

    pub fn total_nodes(&self) -> usize {
        self.datasets.iter().map(|d| d.nodes).sum()
    }
}

/// Prints run statistics to stdout
pub fn print_statistics(stats: &RunStatistics) {
    let started = Utc
        .timestamp_opt(stats.run_date, 0)
        .single()
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| stats.run_date.to_string());

    println!("=== Run {} ({}) ===\n", stats.run_date, started);

    if stats.datasets.is_empty() {
        println!("  No datasets crawled");
        return;
    }

    for dataset in &stats.datasets {
        println!(
            "  {} -> {}: {} pages, {} failed ({:.1}% ok), {:.1}s{}",
            dataset.year,
            dataset.file_name,
            dataset.requested,
            dataset.failed,
            dataset.success_rate(),
            dataset.elapsed_ms as f64 / 1000.0,
            if dataset.use_cache { ", cache trusted" } else { "" }
        );
    }
    println!();

    println!(
        "Total: {} pages requested, {} failed",
        stats.total_requested(),
        stats.total_failed()
    );
    if stats.total_nodes() > 0 {
        println!("Nodes assembled: {}", stats.total_nodes());
    }
}
