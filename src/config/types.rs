use serde::Deserialize;

/// Main configuration structure for the division crawler
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub storage: StorageConfig,
    pub output: OutputConfig,

    /// Cities whose listing skips a level in some years
    #[serde(rename = "skip-level", default = "default_skip_levels")]
    pub skip_level: Vec<SkipLevelEntry>,

    /// Optional nationwide GB/T 2260 detail-page pass
    #[serde(default)]
    pub detail: Option<DetailConfig>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Page listing one link per published dataset (year)
    #[serde(rename = "entry-url")]
    pub entry_url: String,

    /// Legacy charset of the listing pages
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lower bound of the random delay before each request (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the random delay before each request (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Random pause range between two datasets (milliseconds)
    #[serde(rename = "dataset-pause-ms", default = "default_dataset_pause_ms")]
    pub dataset_pause_ms: [u64; 2],

    /// Pool of client identities; the built-in pool is used when empty
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database holding the page cache and run history
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one `<year>.json` tree per dataset
    #[serde(rename = "data-dir")]
    pub data_dir: String,

    /// Directory receiving cache-clean audits and run-history exports
    #[serde(rename = "log-dir")]
    pub log_dir: String,
}

/// One `(code, years) -> level` exception
#[derive(Debug, Clone, Deserialize)]
pub struct SkipLevelEntry {
    /// 12-digit code of the city
    pub code: String,

    /// Years in which the city's listing skips the county tier
    pub years: Vec<String>,

    /// Level actually listed on the city's page in those years
    #[serde(rename = "skip-to", default = "default_skip_to")]
    pub skip_to: String,
}

/// GB/T 2260 detail-page pass configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    /// Index page listing the yearly code-table articles; detail pages
    /// found from it are added to `urls`
    #[serde(rename = "entry-url", default)]
    pub entry_url: Option<String>,

    /// Number of pages of each paginated history list to walk
    #[serde(rename = "history-pages", default = "default_history_pages")]
    pub history_pages: u32,

    /// Detail pages, one per published code table
    #[serde(default)]
    pub urls: Vec<String>,

    /// Maximum number of detail pages in flight
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Directory receiving one `<year>.json` flat code list per page
    #[serde(rename = "data-dir")]
    pub data_dir: String,
}

fn default_encoding() -> String {
    "gb2312".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_min_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    200
}

fn default_dataset_pause_ms() -> [u64; 2] {
    [2000, 3000]
}

fn default_skip_to() -> String {
    "town".to_string()
}

fn default_max_concurrent() -> usize {
    4
}

fn default_history_pages() -> u32 {
    3
}

/// Dongguan, Zhongshan and Danzhou list towns directly under the city in
/// the 2016–2018 releases
pub fn default_skip_levels() -> Vec<SkipLevelEntry> {
    ["441900000000", "442000000000", "460400000000"]
        .iter()
        .map(|code| SkipLevelEntry {
            code: code.to_string(),
            years: vec!["2016".to_string(), "2017".to_string(), "2018".to_string()],
            skip_to: default_skip_to(),
        })
        .collect()
}
