//! Level extractors
//!
//! An extractor turns one child-listing document into the ordered list of
//! records it lists. Extraction rules are site specific and live behind the
//! [`Extractor`] trait; the crawler only ever sees `document -> records`.
//!
//! The built-in implementation understands the statistical-division listing
//! layout, where each level's page holds a `table.<level>table` with one
//! `tr.<level>tr` row per division.

use crate::crawler::fetcher::Document;
use crate::model::{clean_text, ChildRecord, Level};
use crate::ExtractError;
use scraper::{ElementRef, Selector};
use std::collections::HashMap;

/// Extracts the child records listed on one page
pub trait Extractor: Send + Sync {
    fn extract(&self, document: &Document) -> Result<Vec<ChildRecord>, ExtractError>;
}

/// One extractor per level
pub struct Extractors {
    by_level: HashMap<Level, Box<dyn Extractor>>,
}

impl Extractors {
    /// Creates an empty set
    pub fn empty() -> Self {
        Self {
            by_level: HashMap::new(),
        }
    }

    /// Extractors for the statistical-division listing layout
    pub fn stats_gov() -> Self {
        Level::all()
            .into_iter()
            .fold(Self::empty(), |set, level| {
                set.with(level, StatsGovExtractor::new(level))
            })
    }

    /// Registers `extractor` for `level`, replacing any previous one
    pub fn with(mut self, level: Level, extractor: impl Extractor + 'static) -> Self {
        self.by_level.insert(level, Box::new(extractor));
        self
    }

    pub fn get(&self, level: Level) -> Option<&dyn Extractor> {
        self.by_level.get(&level).map(|e| e.as_ref())
    }
}

impl Default for Extractors {
    fn default() -> Self {
        Self::stats_gov()
    }
}

/// Extractor for one level of the statistical-division listing pages
#[derive(Debug, Clone, Copy)]
pub struct StatsGovExtractor {
    level: Level,
}

impl StatsGovExtractor {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn selector(&self, css: &str, document: &Document) -> Result<Selector, ExtractError> {
        Selector::parse(css).map_err(|e| ExtractError {
            url: document.url().to_string(),
            message: format!("invalid selector '{}': {:?}", css, e),
        })
    }

    /// Province pages list several provinces per row, one per cell, with no
    /// code column. The code comes from the link's file name.
    fn extract_provinces(&self, document: &Document) -> Result<Vec<ChildRecord>, ExtractError> {
        let html = document.parse();
        let table = self.selector("table.provincetable", document)?;
        let cells = self.selector("tr.provincetr td", document)?;
        let anchor = self.selector("a", document)?;

        let Some(table) = html.select(&table).next() else {
            return Err(missing_table(document, "table.provincetable"));
        };

        let mut records = Vec::new();
        for cell in table.select(&cells) {
            let name = element_text(&cell);
            if name.is_empty() {
                continue;
            }

            let href = cell
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty());

            let record = match href.and_then(|h| resolve(document, h).map(|link| (h, link))) {
                Some((href, link)) => {
                    ChildRecord::new(name, province_code(href)).with_link(link)
                }
                None => ChildRecord::new(name, String::new()),
            };
            records.push(record);
        }
        Ok(records)
    }

    /// City, county and town pages: code cell (linked when the division has
    /// children) followed by a name cell
    fn extract_linked_rows(&self, document: &Document) -> Result<Vec<ChildRecord>, ExtractError> {
        let html = document.parse();
        let level = self.level.as_str();
        let table_css = format!("table.{}table", level);
        let table = self.selector(&table_css, document)?;
        let rows = self.selector(&format!("tr.{}tr", level), document)?;
        let cells = self.selector("td", document)?;
        let anchor = self.selector("a", document)?;

        let Some(table) = html.select(&table).next() else {
            return Err(missing_table(document, &table_css));
        };

        let mut records = Vec::new();
        for row in table.select(&rows) {
            let tds: Vec<ElementRef> = row.select(&cells).collect();
            if tds.len() < 2 {
                continue;
            }

            let code = element_text(&tds[0]);
            let name = element_text(&tds[1]);
            if code.is_empty() || name.is_empty() {
                continue;
            }

            let link = tds[0]
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .and_then(|h| resolve(document, h));

            let mut record = ChildRecord::new(name, code);
            record.link = link;
            records.push(record);
        }
        Ok(records)
    }

    /// Village pages: code, urban/rural category and name; never linked
    fn extract_villages(&self, document: &Document) -> Result<Vec<ChildRecord>, ExtractError> {
        let html = document.parse();
        let table = self.selector("table.villagetable", document)?;
        let rows = self.selector("tr.villagetr", document)?;
        let cells = self.selector("td", document)?;

        let Some(table) = html.select(&table).next() else {
            return Err(missing_table(document, "table.villagetable"));
        };

        let mut records = Vec::new();
        for row in table.select(&rows) {
            let tds: Vec<ElementRef> = row.select(&cells).collect();
            if tds.len() < 3 {
                continue;
            }

            let code = element_text(&tds[0]);
            let category_code = element_text(&tds[1]);
            let name = element_text(&tds[2]);
            if code.is_empty() || name.is_empty() {
                continue;
            }

            records.push(ChildRecord::new(name, code).with_category(category_code));
        }
        Ok(records)
    }
}

impl Extractor for StatsGovExtractor {
    fn extract(&self, document: &Document) -> Result<Vec<ChildRecord>, ExtractError> {
        match self.level {
            Level::Province => self.extract_provinces(document),
            Level::City | Level::County | Level::Town => self.extract_linked_rows(document),
            Level::Village => self.extract_villages(document),
        }
    }
}

/// Derives a province code from its listing link, e.g. `11.html` -> `110000000000`
pub fn province_code(href: &str) -> String {
    let file_name = href.rsplit('/').next().unwrap_or(href);
    let prefix: String = file_name.chars().take(2).collect();
    format!("{}0000000000", prefix)
}

fn element_text(element: &ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

fn resolve(document: &Document, href: &str) -> Option<String> {
    document.url().join(href).ok().map(|u| u.to_string())
}

fn missing_table(document: &Document, css: &str) -> ExtractError {
    ExtractError {
        url: document.url().to_string(),
        message: format!("no '{}' on page", css),
    }
}
