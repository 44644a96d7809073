//! Division Crawler: incremental administrative-division code crawler
//!
//! This crate walks a statistical-division publication site level by level
//! (province → city → county → town → village), caching every extracted page
//! in a content-addressed store and recording run history so that later runs
//! can decide, per dataset, whether the cache may be trusted.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod history;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for crawler operations
///
/// Only the variants reaching the top-level run loop are fatal. Per-page
/// fetch and extraction failures are caught at the node boundary and never
/// surface here.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No datasets discovered at {url}")]
    NoDatasets { url: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while fetching a single page
///
/// All of these are recoverable: the crawler records the page in the
/// failure list and treats its subtree as empty.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to decode body of {url}: {message}")]
    Decode { url: String, message: String },
}

/// Raised by an extractor when the document does not have the expected layout
#[derive(Debug, Error)]
#[error("Layout mismatch on {url}: {message}")]
pub struct ExtractError {
    pub url: String,
    pub message: String,
}

/// Result type alias for crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

// Re-export commonly used types
pub use cache::{cache_key, CacheJanitor, PageCache};
pub use config::Config;
pub use history::{QueueRecord, RunHistoryTracker, RunRecord};
pub use model::{AdminNode, ChildRecord, Level};
