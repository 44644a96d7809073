//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client (compression negotiation, fixed timeout)
//! - Rotating the client identity per request from a fixed pool
//! - A bounded random delay before every request
//! - Decoding legacy-charset bodies
//! - Error classification

use crate::config::CrawlerConfig;
use crate::FetchError;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use scraper::Html;
use std::time::Duration;
use url::Url;

/// Client identities used when the configuration does not supply a pool
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1",
];

/// A fetched and decoded page
///
/// The decoded text is kept rather than a parsed tree so documents can be
/// held across await points; [`Document::parse`] builds the tree on demand.
#[derive(Debug, Clone)]
pub struct Document {
    url: Url,
    body: String,
}

impl Document {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            body: body.into(),
        }
    }

    /// Final URL of the page, used to resolve relative links
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Parses the body into a traversable document tree
    pub fn parse(&self) -> Html {
        Html::parse_document(&self.body)
    }
}

/// Performs single page fetches with randomized identity and pacing
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    user_agents: Vec<String>,
    base_url: Option<Url>,
    encoding: String,
    min_delay_ms: u64,
    max_delay_ms: u64,
}

impl PageFetcher {
    /// Builds a fetcher from the crawler configuration
    ///
    /// Relative URLs are resolved against `entry-url`.
    ///
    /// # Returns
    ///
    /// * `Ok(PageFetcher)` - Successfully built HTTP client
    /// * `Err(reqwest::Error)` - Failed to build client
    pub fn new(config: &CrawlerConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config.timeout_secs)?;

        let user_agents = if config.user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            config.user_agents.clone()
        };

        Ok(Self {
            client,
            user_agents,
            base_url: Url::parse(&config.entry_url).ok(),
            encoding: config.encoding.clone(),
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
        })
    }

    /// Overrides the charset used when a response does not declare one
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// Resolves `url` to an absolute URL
    pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base_url
                .as_ref()
                .ok_or_else(|| FetchError::InvalidUrl {
                    url: url.to_string(),
                    message: "relative URL without a base".to_string(),
                })?
                .join(url)
                .map_err(|e| FetchError::InvalidUrl {
                    url: url.to_string(),
                    message: e.to_string(),
                }),
            Err(e) => Err(FetchError::InvalidUrl {
                url: url.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// Picks the delay and client identity for one request
    fn pick_identity(&self) -> (Duration, Option<String>) {
        let mut rng = rand::thread_rng();
        let delay = rng.gen_range(self.min_delay_ms..=self.max_delay_ms);
        let user_agent = self.user_agents.choose(&mut rng).cloned();
        (Duration::from_millis(delay), user_agent)
    }

    /// Fetches and decodes one page
    ///
    /// # Request Flow
    ///
    /// 1. Sleep a random delay within the configured bounds
    /// 2. GET with a user agent drawn uniformly from the pool
    /// 3. Reject non-2xx statuses
    /// 4. Decode the body with the response charset, or the configured
    ///    legacy charset when the response declares none
    ///
    /// Every failure is a [`FetchError`]; callers decide whether it is fatal.
    pub async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        let target = self.resolve(url)?;
        let (delay, user_agent) = self.pick_identity();

        tokio::time::sleep(delay).await;

        let mut request = self.client.get(target.clone());
        if let Some(user_agent) = user_agent {
            request = request.header(USER_AGENT, user_agent);
        }

        tracing::debug!("GET {}", target);
        let response = request
            .send()
            .await
            .map_err(|e| classify_error(target.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: target.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let body = response
            .text_with_charset(&self.encoding)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        url: target.to_string(),
                    }
                } else {
                    FetchError::Decode {
                        url: target.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        Ok(Document::new(final_url, body))
    }
}

/// Builds an HTTP client with compression negotiation and a fixed timeout
///
/// The user agent is set per request, not on the client.
pub fn build_http_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Maps a transport-level reqwest error to a fetch error
fn classify_error(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(entry_url: &str) -> CrawlerConfig {
        CrawlerConfig {
            entry_url: entry_url.to_string(),
            encoding: "gb2312".to_string(),
            timeout_secs: 5,
            min_delay_ms: 0,
            max_delay_ms: 0,
            dataset_pause_ms: [0, 0],
            user_agents: vec!["TestAgent/1.0".to_string()],
        }
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(5).is_ok());
    }

    #[test]
    fn test_default_pool_used_when_config_empty() {
        let mut config = create_test_config("http://example.com/");
        config.user_agents.clear();
        let fetcher = PageFetcher::new(&config).unwrap();
        assert_eq!(fetcher.user_agents.len(), DEFAULT_USER_AGENTS.len());
    }

    #[test]
    fn test_pick_identity_stays_in_bounds() {
        let mut config = create_test_config("http://example.com/");
        config.min_delay_ms = 10;
        config.max_delay_ms = 200;
        config.user_agents = vec!["a".to_string(), "b".to_string()];
        let fetcher = PageFetcher::new(&config).unwrap();

        for _ in 0..100 {
            let (delay, ua) = fetcher.pick_identity();
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_millis(200));
            assert!(matches!(ua.as_deref(), Some("a") | Some("b")));
        }
    }

    #[test]
    fn test_resolve_relative_against_base() {
        let fetcher =
            PageFetcher::new(&create_test_config("http://example.com/tjyqhdmhcxhfdm/2020/index.html"))
                .unwrap();
        assert_eq!(
            fetcher.resolve("11.html").unwrap().as_str(),
            "http://example.com/tjyqhdmhcxhfdm/2020/11.html"
        );
        assert_eq!(
            fetcher.resolve("http://other.com/x.html").unwrap().as_str(),
            "http://other.com/x.html"
        );
    }

    #[tokio::test]
    async fn test_fetch_decodes_declared_charset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .and(header_exists("user-agent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    "<html><body>北京市</body></html>".as_bytes(),
                    "text/html; charset=utf-8",
                ),
            )
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&create_test_config(&server.uri())).unwrap();
        let doc = fetcher
            .fetch(&format!("{}/index.html", server.uri()))
            .await
            .unwrap();

        assert!(doc.body().contains("北京市"));
        assert!(doc.url().as_str().ends_with("/index.html"));
    }

    #[tokio::test]
    async fn test_fetch_falls_back_to_configured_legacy_charset() {
        let server = MockServer::start().await;
        // "北京市" in GB2312, served without a charset parameter
        let mut body = b"<html><body>".to_vec();
        body.extend_from_slice(&[0xB1, 0xB1, 0xBE, 0xA9, 0xCA, 0xD0]);
        body.extend_from_slice(b"</body></html>");
        Mock::given(method("GET"))
            .and(path("/11.html"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html"))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&create_test_config(&server.uri())).unwrap();
        let doc = fetcher.fetch("11.html").await.unwrap();

        assert_eq!(doc.body(), "<html><body>北京市</body></html>");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = PageFetcher::new(&create_test_config(&server.uri())).unwrap();
        let err = fetcher
            .fetch(&format!("{}/missing.html", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_transport_error() {
        let fetcher = PageFetcher::new(&create_test_config("http://127.0.0.1:9/")).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/index.html").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Transport { .. } | FetchError::Timeout { .. }
        ));
    }
}
