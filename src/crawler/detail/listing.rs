//! Detail-page discovery
//!
//! The ministry index links two kinds of lists. A list titled with a single
//! year holds the latest release, whose newest article (skipping change
//! notices) is the code table. A list titled with a year range (`2009-2019`)
//! is a paginated archive: each article titled with a year either embeds a
//! link to the code table under `#zoom` or is the table itself.

use crate::crawler::fetcher::{Document, PageFetcher};
use crate::model::clean_text;
use crate::Result;
use regex::Regex;
use scraper::Selector;
use std::sync::OnceLock;

const CHANGE_NOTICE: &str = "变更情况";

fn range_title() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}-\d{4}").expect("range title pattern is valid"))
}

fn year_title() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}").expect("year title pattern is valid"))
}

/// A list linked from the index page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleList {
    /// Latest release; its first non-notice article is the table
    Newest(String),
    /// Paginated archive of earlier releases
    History(String),
}

/// Text, title and absolute target of one anchor
struct Link {
    text: String,
    title: String,
    href: Option<String>,
}

/// Collects the anchors matching `selector`, resolved against the page URL
fn links(document: &Document, selector: &str) -> Vec<Link> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    let html = document.parse();
    let found: Vec<Link> = html
        .select(&selector)
        .map(|anchor| Link {
            text: clean_text(&anchor.text().collect::<String>()),
            title: clean_text(anchor.value().attr("title").unwrap_or_default()),
            href: anchor
                .value()
                .attr("href")
                .and_then(|href| document.url().join(href).ok())
                .map(|url| url.to_string()),
        })
        .collect();
    found
}

/// Lists on the index page, in page order
pub fn parse_index(document: &Document) -> Vec<ArticleList> {
    links(document, "ul.cxfw_ul a")
        .into_iter()
        .filter_map(|link| {
            let href = link.href?;
            if range_title().is_match(&link.text) {
                Some(ArticleList::History(href))
            } else if year_title().is_match(&link.text) {
                Some(ArticleList::Newest(href))
            } else {
                None
            }
        })
        .collect()
}

/// First article of a list that is not a change notice
pub fn newest_article(document: &Document) -> Option<String> {
    links(document, "table.article a.artitlelist")
        .into_iter()
        .find(|link| !link.title.contains(CHANGE_NOTICE))
        .and_then(|link| link.href)
}

/// Articles of one archive page whose title starts with a year
pub fn history_articles(document: &Document) -> Vec<String> {
    links(document, "table.article tr a.artitlelist")
        .into_iter()
        .filter(|link| year_title().is_match(&link.title))
        .filter_map(|link| link.href)
        .collect()
}

/// The code table an article points at: its first `#zoom` link, or the
/// article itself
pub fn article_target(document: &Document) -> String {
    links(document, "#zoom a")
        .into_iter()
        .find_map(|link| link.href)
        .unwrap_or_else(|| document.url().to_string())
}

/// URL of page `page` (1-based) of an archive list
fn history_page_url(list_url: &str, page: u32) -> String {
    if page == 1 {
        list_url.to_string()
    } else {
        format!("{}?{}", list_url, page)
    }
}

/// Discovers detail-page URLs starting from the index at `entry_url`
///
/// The index fetch is the only fatal failure. A list or article that cannot
/// be fetched is logged and skipped.
pub async fn discover_detail_urls(
    fetcher: &PageFetcher,
    entry_url: &str,
    history_pages: u32,
) -> Result<Vec<String>> {
    let index = fetcher.fetch(entry_url).await?;
    let lists = parse_index(&index);
    tracing::debug!("{} lists on {}", lists.len(), entry_url);

    let mut urls = Vec::new();
    for list in lists {
        match list {
            ArticleList::Newest(list_url) => match fetcher.fetch(&list_url).await {
                Ok(document) => match newest_article(&document) {
                    Some(article) => urls.push(article),
                    None => tracing::warn!("No code-table article on {}", list_url),
                },
                Err(e) => tracing::warn!("Skipping list {}: {}", list_url, e),
            },
            ArticleList::History(list_url) => {
                for page in 1..=history_pages {
                    let page_url = history_page_url(&list_url, page);
                    let document = match fetcher.fetch(&page_url).await {
                        Ok(document) => document,
                        Err(e) => {
                            tracing::warn!("Skipping archive page {}: {}", page_url, e);
                            continue;
                        }
                    };
                    for article in history_articles(&document) {
                        match fetcher.fetch(&article).await {
                            Ok(document) => urls.push(article_target(&document)),
                            Err(e) => tracing::warn!("Skipping article {}: {}", article, e),
                        }
                    }
                }
            }
        }
    }

    tracing::info!("Discovered {} detail pages from {}", urls.len(), entry_url);
    Ok(urls)
}
