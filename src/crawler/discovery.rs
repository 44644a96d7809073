//! Dataset discovery from the publication entry page
//!
//! The entry page lists one item per published release. Each item links to
//! that release's province listing and carries a publication date and a
//! release year, which together identify the dataset in the run history.

use crate::crawler::fetcher::Document;
use crate::history::QueueRecord;
use regex::Regex;
use scraper::Selector;
use std::sync::OnceLock;

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{2,4})-(\d{1,2})-(\d{1,2})").expect("date pattern is valid")
    })
}

fn year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d{2,4})").expect("year pattern is valid"))
}

/// Parses the entry page into one queue record per release
///
/// Items missing a date, a year or a link are skipped. The publication date
/// `YYYY-MM-DD` becomes `lastModified` as `YYYY/M/D` with the digits kept as
/// written on the page.
pub fn discover_datasets(document: &Document) -> Vec<QueueRecord> {
    let html = document.parse();
    let (Ok(items), Ok(date_cell), Ok(year_cell)) = (
        Selector::parse("ul.center_list_contlist li > a"),
        Selector::parse(".cont_tit02"),
        Selector::parse(".cont_tit03"),
    ) else {
        return Vec::new();
    };

    let mut queues = Vec::new();
    for item in html.select(&items) {
        let date_text: String = item
            .select(&date_cell)
            .flat_map(|e| e.text())
            .collect();
        let year_text: String = item
            .select(&year_cell)
            .flat_map(|e| e.text())
            .collect();

        let Some(date) = date_pattern().captures(&date_text) else {
            continue;
        };
        let Some(year) = year_pattern().captures(&year_text) else {
            continue;
        };
        let Some(url) = item
            .value()
            .attr("href")
            .and_then(|href| document.url().join(href.trim()).ok())
        else {
            continue;
        };

        let last_modified = format!("{}/{}/{}", &date[1], &date[2], &date[3]);
        queues.push(QueueRecord::new(url.to_string(), last_modified, &year[1]));
    }

    tracing::debug!("Discovered {} datasets on {}", queues.len(), document.url());
    queues
}
