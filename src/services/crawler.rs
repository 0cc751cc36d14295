// src/services/crawler.rs

//! Post crawler service.
//!
//! Fetches a blog's index pages and records every post link it finds in the
//! known-post registry.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::registry::KnownPosts;
use crate::utils::http::{create_async_client, fetch_page_text};
use crate::utils::validate::{is_valid_post_id, normalize_post_id};
use crate::utils::{site_id, site_url};

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Result of crawling one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub site_id: String,
    /// Distinct post ids found on the index pages
    pub discovered: Vec<String>,
    /// How many of them were new to the registry
    pub added: usize,
    pub page_total: usize,
    pub page_failures: usize,
}

/// Service for discovering posts on a blog.
pub struct PostCrawler {
    client: Client,
    index_paths: Vec<String>,
    post_prefix: String,
}

impl PostCrawler {
    /// Create a new post crawler with the given configuration.
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            index_paths: config.index_paths.clone(),
            post_prefix: config.post_prefix.clone(),
        })
    }

    /// Fetch the index pages of `host` and return the distinct post ids found.
    ///
    /// A single failing index page is tolerated; the crawl only fails when every page does.
    pub async fn discover(&self, host: &str) -> Result<CrawlOutcome> {
        let base = site_url(host)?;
        let mut outcome = CrawlOutcome {
            site_id: site_id(&base),
            page_total: self.index_paths.len(),
            ..CrawlOutcome::default()
        };

        let mut found = BTreeSet::new();
        let mut last_error = None;
        for path in &self.index_paths {
            let page = base.join(path)?;
            debug!(url = %page, "fetching index page");
            match fetch_page_text(&self.client, page.as_str()).await {
                Ok(html) => found.extend(extract_post_ids(&html, &base, &self.post_prefix)),
                Err(error) => {
                    outcome.page_failures += 1;
                    warn!(url = %page, %error, "failed to fetch index page");
                    last_error = Some(error);
                }
            }
        }

        if outcome.page_failures == outcome.page_total {
            return Err(last_error
                .unwrap_or_else(|| AppError::crawl(host, "no index paths configured")));
        }

        outcome.discovered = found.into_iter().collect();
        Ok(outcome)
    }

    /// Crawl `host` and add everything found to `registry`.
    pub async fn crawl_host(&self, host: &str, registry: &KnownPosts) -> Result<CrawlOutcome> {
        let mut outcome = self.discover(host).await?;
        outcome.added = registry.extend(&outcome.site_id, outcome.discovered.iter().cloned());
        info!(
            site_id = %outcome.site_id,
            discovered = outcome.discovered.len(),
            added = outcome.added,
            "crawled index pages"
        );
        Ok(outcome)
    }
}

/// Pull post ids out of an index page.
///
/// Relative links must start with `post_prefix`. Absolute links count only when they point
/// at the same host as `base`, and are reduced to their path. One trailing `/` is stripped
/// and anything failing [`is_valid_post_id`] is skipped.
pub fn extract_post_ids(html: &str, base: &Url, post_prefix: &str) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let mut posts = BTreeSet::new();

    for anchor in document.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        let Some(candidate) = candidate_path(href, base) else {
            continue;
        };
        if !candidate.starts_with(post_prefix) {
            continue;
        }

        let post_id = normalize_post_id(&candidate);
        if !is_valid_post_id(post_id) {
            warn!(href, "skipping link with invalid post ID");
            continue;
        }
        posts.insert(post_id.to_string());
    }
    posts
}

fn candidate_path(href: &str, base: &Url) -> Option<String> {
    if href.starts_with('/') && !href.starts_with("//") {
        return Some(href.to_string());
    }
    let link = base.join(href).ok()?;
    let same_host = link.host_str() == base.host_str()
        && link.port_or_known_default() == base.port_or_known_default();
    if matches!(link.scheme(), "http" | "https") && same_host && is_absolute(href) {
        Some(link.path().to_string())
    } else {
        None
    }
}

fn is_absolute(href: &str) -> bool {
    href.starts_with("//") || href.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const INDEX: &str = r#"<html><body>
        <a href="/2024/01/01/foo">Foo</a>
        <a href="/2024/01/02/bar/">Bar</a>
        <a href="/about">About</a>
        <a href="/2024/01/01/foo">Foo again</a>
    </body></html>"#;

    fn config() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    #[test]
    fn test_extract_relative_links() {
        let base = Url::parse("https://blog.example.com/").unwrap();
        let posts = extract_post_ids(INDEX, &base, "/2");
        assert_eq!(
            posts.into_iter().collect::<Vec<_>>(),
            vec!["/2024/01/01/foo", "/2024/01/02/bar"]
        );
    }

    #[test]
    fn test_extract_skips_invalid_and_foreign_links() {
        let base = Url::parse("https://blog.example.com/").unwrap();
        let html = r#"
            <a href="/2024/01/01/foo?x=1">query</a>
            <a href="https://other.com/2024/01/01/evil">foreign</a>
            <a href="https://blog.example.com/2024/02/02/abs/">absolute</a>
            <a href="//blog.example.com/2024/03/03/proto">protocol relative</a>
            <a href="mailto:me@blog.example.com">mail</a>
            <a>no href</a>
        "#;
        let posts: Vec<_> = extract_post_ids(html, &base, "/2").into_iter().collect();
        assert_eq!(posts, vec!["/2024/02/02/abs", "/2024/03/03/proto"]);
    }

    #[tokio::test]
    async fn test_crawl_host_registers_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;

        let crawler = PostCrawler::new(&config()).unwrap();
        let registry = KnownPosts::new();
        let outcome = crawler.crawl_host(&server.uri(), &registry).await.unwrap();

        let site = site_id(&Url::parse(&server.uri()).unwrap());
        assert_eq!(outcome.site_id, site);
        assert_eq!(outcome.added, 2);
        assert!(registry.is_known(&site, "/2024/01/01/foo"));
        assert!(registry.is_known(&site, "/2024/01/02/bar"));
        assert!(!registry.is_known(&site, "/2024/01/02/bar/"));
        assert_eq!(registry.count(), 2);
    }

    #[tokio::test]
    async fn test_recrawl_is_monotonic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"<a href="/2024/05/05/new">n</a>"#),
            )
            .mount(&server)
            .await;

        let crawler = PostCrawler::new(&config()).unwrap();
        let registry = KnownPosts::new();
        crawler.crawl_host(&server.uri(), &registry).await.unwrap();
        let second = crawler.crawl_host(&server.uri(), &registry).await.unwrap();

        assert_eq!(second.added, 1);
        assert_eq!(registry.count(), 3);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let crawler = PostCrawler::new(&config()).unwrap();
        let registry = KnownPosts::new();
        let result = crawler.crawl_host(&server.uri(), &registry).await;

        assert!(matches!(result, Err(AppError::Crawl { .. })));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_partial_index_failure_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(INDEX))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/archive"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut config = config();
        config.index_paths = vec!["/".to_string(), "/archive".to_string()];
        let crawler = PostCrawler::new(&config).unwrap();
        let outcome = crawler.discover(&server.uri()).await.unwrap();

        assert_eq!(outcome.page_total, 2);
        assert_eq!(outcome.page_failures, 1);
        assert_eq!(outcome.discovered.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_non_http_scheme() {
        let crawler = PostCrawler::new(&config()).unwrap();
        let registry = KnownPosts::new();
        let result = crawler.crawl_host("file:///etc/passwd", &registry).await;
        assert!(matches!(result, Err(AppError::Crawl { .. })));
    }
}
