//! Depth-first level crawler
//!
//! Walks one dataset from its province listing down to villages. Siblings are
//! visited one at a time and each subtree is fully resolved before the next
//! sibling starts, so at most one request is ever in flight.
//!
//! Per-page failures never escape a node: a page that cannot be fetched or
//! extracted is recorded in the failure list and its node gets an empty
//! children array. Only storage errors abort the walk.

use crate::cache::{cache_key, PageCache};
use crate::crawler::exceptions::SkipLevelTable;
use crate::crawler::extractor::Extractors;
use crate::crawler::fetcher::PageFetcher;
use crate::history::PageRequest;
use crate::model::{AdminNode, ChildRecord, Level};
use crate::storage::{KeyValueStore, StorageResult};
use crate::ExtractError;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Pages requested during one crawl, split by outcome
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlLog {
    /// Pages fetched and extracted successfully
    pub requested: Vec<PageRequest>,
    /// Pages whose fetch or extraction failed
    pub failed: Vec<PageRequest>,
}

/// Recursive walker for one dataset
pub struct LevelCrawler<'a, S: KeyValueStore> {
    fetcher: &'a PageFetcher,
    cache: &'a mut PageCache<S>,
    extractors: &'a Extractors,
    exceptions: &'a SkipLevelTable,
    use_cache: bool,
    log: CrawlLog,
}

impl<'a, S: KeyValueStore> LevelCrawler<'a, S> {
    /// Creates a crawler
    ///
    /// With `use_cache` false every page is fetched from origin; successful
    /// extractions are still written to the cache.
    pub fn new(
        fetcher: &'a PageFetcher,
        cache: &'a mut PageCache<S>,
        extractors: &'a Extractors,
        exceptions: &'a SkipLevelTable,
        use_cache: bool,
    ) -> Self {
        Self {
            fetcher,
            cache,
            extractors,
            exceptions,
            use_cache,
            log: CrawlLog::default(),
        }
    }

    /// Crawls the dataset rooted at the province listing `root_url`
    ///
    /// # Returns
    ///
    /// * `Ok(provinces)` - The assembled tree, possibly with empty subtrees
    /// * `Err(StorageError)` - The cache store failed; the walk is aborted
    pub async fn crawl(&mut self, root_url: &str) -> StorageResult<Vec<AdminNode>> {
        let provinces = self.listing(root_url, Level::Province, None).await?;
        tracing::info!("{} provinces listed at {}", provinces.len(), root_url);
        self.resolve(provinces, Level::Province).await
    }

    /// Consumes the crawler, returning the request log
    pub fn into_log(self) -> CrawlLog {
        self.log
    }

    /// Produces the child records listed at `url`
    ///
    /// Cache first when trusted, then fetch and extract. Non-empty results
    /// are written back to the cache.
    async fn listing(
        &mut self,
        url: &str,
        level: Level,
        parent: Option<&ChildRecord>,
    ) -> StorageResult<Vec<ChildRecord>> {
        if self.use_cache {
            if let Some(cached) = self.cache.get(url)? {
                return Ok(cached);
            }
        }

        let request = PageRequest {
            url: url.to_string(),
            cache_key: cache_key(url),
            level,
            name: parent.map(|p| p.name.clone()),
            code: parent.map(|p| p.code.clone()).filter(|c| !c.is_empty()),
        };

        let document = match self.fetcher.fetch(url).await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Fetch failed for {} listing {}: {}", level, url, e);
                self.log.failed.push(request);
                return Ok(Vec::new());
            }
        };

        let extracted = match self.extractors.get(level) {
            Some(extractor) => extractor.extract(&document),
            None => Err(ExtractError {
                url: url.to_string(),
                message: format!("no extractor registered for {}", level),
            }),
        };

        let records = match extracted {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("{}", e);
                self.log.failed.push(request);
                return Ok(Vec::new());
            }
        };

        self.log.requested.push(request);
        if self.cache.put(url, &records)? {
            tracing::debug!("Cached {} {} records from {}", records.len(), level, url);
        } else {
            tracing::debug!("Empty {} listing at {}, not cached", level, url);
        }
        Ok(records)
    }

    /// Turns the records of one listing into nodes, descending into every
    /// linked record before moving to the next sibling
    fn resolve<'b>(
        &'b mut self,
        records: Vec<ChildRecord>,
        level: Level,
    ) -> BoxFuture<'b, StorageResult<Vec<AdminNode>>> {
        Box::pin(async move {
            let mut nodes = Vec::with_capacity(records.len());
            for record in records {
                let link = match record.link.as_deref() {
                    Some(link) if !link.is_empty() => link.to_string(),
                    _ => {
                        nodes.push(AdminNode::leaf(&record));
                        continue;
                    }
                };

                let Some(child_level) = self.exceptions.child_level(level, &record.code, &link)
                else {
                    nodes.push(AdminNode::leaf(&record));
                    continue;
                };

                if level == Level::Province {
                    tracing::info!("Crawling {} ({})", record.name, record.code);
                }

                let children = self.listing(&link, child_level, Some(&record)).await?;
                let child_nodes = self.resolve(children, child_level).await?;
                nodes.push(AdminNode::branch(&record, child_level, child_nodes));
            }
            Ok(nodes)
        })
    }
}
