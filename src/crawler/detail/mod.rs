//! Nationwide GB/T 2260 detail-page pass
//!
//! Each detail page publishes one full six-digit code table. Pages come from
//! the configured list plus whatever [`listing`] discovers from the index.
//! They are independent of each other and of the level crawl, so they are
//! fetched with bounded parallelism: at most `max-concurrent` pages in flight.

pub mod listing;

use crate::config::{CrawlerConfig, DetailConfig};
use crate::crawler::fetcher::{Document, PageFetcher};
use crate::model::clean_text;
use crate::output::write_json_file;
use crate::{CrawlerError, ExtractError, Result};
use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

fn redirect_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"window\.location\.href="(.*)""#).expect("redirect pattern is valid")
    })
}

fn code_row_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{6}).??(\D+)").expect("code row pattern is valid"))
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{4})").expect("year pattern is valid"))
}

/// One `{code, name}` row of a detail table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailEntry {
    pub code: String,
    pub name: String,
}

impl DetailEntry {
    pub fn is_province(&self) -> bool {
        self.code.ends_with("0000")
    }

    pub fn is_city(&self) -> bool {
        !self.is_province() && self.code.ends_with("00")
    }
}

/// A parsed detail page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailTable {
    pub url: String,
    /// Release year from the table heading; empty when the page has none
    pub year: String,
    pub entries: Vec<DetailEntry>,
}

impl DetailTable {
    pub fn provinces(&self) -> usize {
        self.entries.iter().filter(|e| e.is_province()).count()
    }

    pub fn cities(&self) -> usize {
        self.entries.iter().filter(|e| e.is_city()).count()
    }

    pub fn counties(&self) -> usize {
        self.entries.len() - self.provinces() - self.cities()
    }

    /// Year used to name the output file, falling back to the URL
    pub fn file_year(&self) -> Option<String> {
        if !self.year.is_empty() {
            return Some(self.year.clone());
        }
        year_pattern()
            .captures(&self.url)
            .map(|c| c[1].to_string())
    }
}

/// What a detail page turned out to contain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailPage {
    /// A script redirect to the real table
    Redirect(String),
    Table(DetailTable),
}

/// Parses one detail page
pub fn parse_detail_page(document: &Document) -> DetailPage {
    let html = document.parse();

    if let Ok(scripts) = Selector::parse("script") {
        let redirect = html.select(&scripts).find_map(|script| {
            let text: String = script.text().collect();
            redirect_pattern()
                .captures(&text)
                .map(|c| c[1].to_string())
                .filter(|href| !href.is_empty())
        });
        if let Some(href) = redirect {
            let target = document
                .url()
                .join(&href)
                .map(|u| u.to_string())
                .unwrap_or(href);
            return DetailPage::Redirect(target);
        }
    }

    let mut table = DetailTable {
        url: document.url().to_string(),
        year: String::new(),
        entries: Vec::new(),
    };

    let Ok(rows) = Selector::parse("table tr") else {
        return DetailPage::Table(table);
    };

    for row in html.select(&rows) {
        let text = clean_text(&row.text().collect::<String>());
        match code_row_pattern().captures(&text) {
            Some(c) => {
                let name = clean_text(&c[2]);
                if !name.is_empty() {
                    table.entries.push(DetailEntry {
                        code: c[1].to_string(),
                        name,
                    });
                }
            }
            None => {
                if text.len() >= 4 && text.as_bytes()[..4].iter().all(u8::is_ascii_digit) {
                    table.year = text[..4].to_string();
                }
            }
        }
    }

    DetailPage::Table(table)
}

/// Fetches one detail page, following a script redirect once
pub async fn fetch_detail_table(fetcher: &PageFetcher, url: &str) -> Result<DetailTable> {
    let document = fetcher.fetch(url).await?;
    let target = match parse_detail_page(&document) {
        DetailPage::Table(table) => return Ok(table),
        DetailPage::Redirect(target) => target,
    };

    tracing::debug!("{} redirects to {}", url, target);
    let document = fetcher.fetch(&target).await?;
    match parse_detail_page(&document) {
        DetailPage::Table(table) => Ok(table),
        DetailPage::Redirect(next) => Err(CrawlerError::Extract(ExtractError {
            url: target,
            message: format!("second redirect to {}", next),
        })),
    }
}

/// Outcome of one detail page
#[derive(Debug)]
pub struct DetailOutcome {
    pub url: String,
    pub result: Result<PathBuf>,
}

/// Runs the detail pass over every configured and discovered page
///
/// An unreachable index page is fatal. Failed pages are logged and reported;
/// they never stop the other pages.
pub async fn run_detail_pass(
    crawler: &CrawlerConfig,
    detail: &DetailConfig,
) -> Result<Vec<DetailOutcome>> {
    let fetcher = Arc::new(PageFetcher::new(crawler)?.with_encoding("utf-8"));
    let semaphore = Arc::new(Semaphore::new(detail.max_concurrent));
    let data_dir = Arc::new(PathBuf::from(&detail.data_dir));

    let mut urls = detail.urls.clone();
    if let Some(entry_url) = &detail.entry_url {
        let discovered =
            listing::discover_detail_urls(&fetcher, entry_url, detail.history_pages).await?;
        for url in discovered {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }

    tracing::info!(
        "Detail pass: {} pages, {} at a time",
        urls.len(),
        detail.max_concurrent
    );

    let mut tasks = JoinSet::new();
    for url in &urls {
        let fetcher = fetcher.clone();
        let semaphore = semaphore.clone();
        let data_dir = data_dir.clone();
        let url = url.clone();

        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => process_page(&fetcher, &url, &data_dir).await,
                Err(e) => Err(CrawlerError::Io(std::io::Error::other(e.to_string()))),
            };
            DetailOutcome { url, result }
        });
    }

    let mut outcomes = Vec::with_capacity(urls.len());
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => {
                if let Err(e) = &outcome.result {
                    tracing::warn!("Detail page {} skipped: {}", outcome.url, e);
                }
                outcomes.push(outcome);
            }
            Err(e) => tracing::error!("Detail task panicked: {}", e),
        }
    }
    Ok(outcomes)
}

async fn process_page(fetcher: &PageFetcher, url: &str, data_dir: &Path) -> Result<PathBuf> {
    let table = fetch_detail_table(fetcher, url).await?;
    let year = table.file_year().ok_or_else(|| ExtractError {
        url: table.url.clone(),
        message: "no release year on page or in URL".to_string(),
    })?;

    if table.entries.is_empty() {
        return Err(ExtractError {
            url: table.url.clone(),
            message: "no code rows".to_string(),
        }
        .into());
    }

    let path = data_dir.join(format!("{}.json", year));
    write_json_file(&path, &table.entries)?;

    tracing::info!(
        "{}: {} codes (province {}, city {}, county {}) -> {}",
        year,
        table.entries.len(),
        table.provinces(),
        table.cities(),
        table.counties(),
        path.display()
    );
    Ok(path)
}
