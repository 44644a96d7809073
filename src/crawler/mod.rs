//! Crawler module for the division listing site
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with randomized identity and pacing
//! - Per-level record extraction and dataset discovery
//! - Depth-first level crawling over the page cache
//! - Overall run coordination
//! - The independent GB/T 2260 detail pass

mod coordinator;
pub mod detail;
mod discovery;
mod exceptions;
mod extractor;
mod fetcher;
mod level;

pub use coordinator::{Coordinator, DatasetPlan, RunOptions};
pub use detail::{run_detail_pass, DetailEntry, DetailOutcome, DetailTable};
pub use discovery::discover_datasets;
pub use exceptions::SkipLevelTable;
pub use extractor::{province_code, Extractor, Extractors, StatsGovExtractor};
pub use fetcher::{build_http_client, Document, PageFetcher, DEFAULT_USER_AGENTS};
pub use level::{CrawlLog, LevelCrawler};

use crate::config::Config;
use crate::output::RunStatistics;
use crate::Result;

/// Runs a complete incremental crawl
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the page cache and run history
/// 2. Discover the published datasets
/// 3. Decide per dataset whether the cache may be trusted
/// 4. Crawl every dataset and write its tree
/// 5. Commit the run record
///
/// # Example
///
/// ```no_run
/// use division_crawler::config::load_config;
/// use division_crawler::crawler::{crawl, RunOptions};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// crawl(config, RunOptions::default()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: Config, options: RunOptions) -> Result<RunStatistics> {
    let mut coordinator = Coordinator::new(config, options)?;
    coordinator.run().await
}
