//! Output module for everything the crawler writes to disk
//!
//! This module handles:
//! - Writing one JSON tree per dataset
//! - Cache-clean audits and run-history exports under the log directory
//! - Crawl statistics

mod audit;
mod json;
pub mod stats;
mod traits;

pub use audit::{export_run_history, write_clean_audit};
pub use json::{write_json_file, JsonFileWriter};
pub use stats::{print_statistics, DatasetStats, RunStatistics};
pub use traits::{DatasetWriter, OutputError, OutputResult};
