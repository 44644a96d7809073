use crate::config::types::{
    Config, CrawlerConfig, DetailConfig, OutputConfig, SkipLevelEntry, StorageConfig,
};
use crate::model::Level;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_storage_config(&config.storage)?;
    validate_output_config(&config.output)?;
    validate_skip_levels(&config.skip_level)?;
    if let Some(detail) = &config.detail {
        validate_detail_config(detail)?;
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    validate_http_url(&config.entry_url, "entry_url")?;

    if config.encoding.trim().is_empty() {
        return Err(ConfigError::Validation(
            "encoding cannot be empty".to_string(),
        ));
    }

    if !(5..=30).contains(&config.timeout_secs) {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 5 and 30, got {}",
            config.timeout_secs
        )));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    let [pause_min, pause_max] = config.dataset_pause_ms;
    if pause_min > pause_max {
        return Err(ConfigError::Validation(format!(
            "dataset_pause_ms range is reversed: [{}, {}]",
            pause_min, pause_max
        )));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data_dir cannot be empty".to_string(),
        ));
    }

    if config.log_dir.is_empty() {
        return Err(ConfigError::Validation(
            "log_dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the skip-level exception table
fn validate_skip_levels(entries: &[SkipLevelEntry]) -> Result<(), ConfigError> {
    for entry in entries {
        if entry.code.len() != 12 || !entry.code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Validation(format!(
                "skip-level code must be 12 digits, got '{}'",
                entry.code
            )));
        }

        if entry.years.is_empty() {
            return Err(ConfigError::Validation(format!(
                "skip-level entry '{}' must list at least one year",
                entry.code
            )));
        }

        if let Some(year) = entry
            .years
            .iter()
            .find(|y| y.len() != 4 || !y.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(ConfigError::Validation(format!(
                "skip-level entry '{}' has invalid year '{}'",
                entry.code, year
            )));
        }

        match Level::from_name(&entry.skip_to) {
            Some(level) if level > Level::County => {}
            _ => {
                return Err(ConfigError::Validation(format!(
                    "skip-level entry '{}' must skip to 'town' or 'village', got '{}'",
                    entry.code, entry.skip_to
                )))
            }
        }
    }
    Ok(())
}

/// Validates the detail-pass configuration
fn validate_detail_config(config: &DetailConfig) -> Result<(), ConfigError> {
    if !(1..=32).contains(&config.max_concurrent) {
        return Err(ConfigError::Validation(format!(
            "max_concurrent must be between 1 and 32, got {}",
            config.max_concurrent
        )));
    }

    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "detail data_dir cannot be empty".to_string(),
        ));
    }

    if config.entry_url.is_none() && config.urls.is_empty() {
        return Err(ConfigError::Validation(
            "detail needs an entry-url or at least one url".to_string(),
        ));
    }

    if let Some(entry_url) = &config.entry_url {
        validate_http_url(entry_url, "detail entry_url")?;
    }

    if config.history_pages > 50 {
        return Err(ConfigError::Validation(format!(
            "history_pages must be at most 50, got {}",
            config.history_pages
        )));
    }

    for url in &config.urls {
        validate_http_url(url, "detail url")?;
    }

    Ok(())
}

/// Validates that `value` is an absolute http(s) URL
fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}
