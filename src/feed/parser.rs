use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use super::cache::{CacheLookup, FeedCache};
use super::chapters::ChapterResolver;
use super::fetcher::{build_client, Fetcher};
use super::normalize::normalize;
use super::types::{CachedFeed, ParsedFeed};
use super::xml;
use crate::config::ParserConfig;
use crate::error::FeedError;
use crate::util::validate_url;

/// Orchestration failures carried as the cause of [`FeedError::FeedParse`].
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("Server answered 304 Not Modified but no cached copy exists")]
    NotModifiedWithoutCache,
}

/// Fetches, parses and caches podcast feeds.
///
/// The cache is injected so that several parsers (or a parser and a
/// maintenance task calling [`FeedCache::sweep_expired`]) can share it.
#[derive(Debug, Clone)]
pub struct FeedParser {
    fetcher: Fetcher,
    chapters: ChapterResolver,
    cache: Arc<FeedCache>,
    allow_private_hosts: bool,
}

impl FeedParser {
    /// Builds a parser with its own HTTP client.
    pub fn new(config: &ParserConfig, cache: Arc<FeedCache>) -> Result<Self, reqwest::Error> {
        let client = build_client(config)?;
        Ok(Self::with_client(client, config, cache))
    }

    /// Builds a parser around an existing client (shared connection pool).
    pub fn with_client(
        client: reqwest::Client,
        config: &ParserConfig,
        cache: Arc<FeedCache>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(client.clone(), config),
            chapters: ChapterResolver::new(client, config),
            cache,
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    /// Returns the feed at `url`, from cache when fresh.
    ///
    /// A fresh cache entry is returned without any network traffic. Otherwise
    /// the feed is fetched conditionally with the validators of the (possibly
    /// expired) cached entry; a 304 answer re-stamps and returns that entry.
    /// A full response is parsed, normalized, has its chapters resolved and is
    /// cached before being returned.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Network`] from the fetch, unchanged
    /// - [`FeedError::XmlParse`] when the body is not an RSS document
    /// - [`FeedError::FeedParse`] when the URL is rejected
    ///   ([`UrlValidationError`](crate::util::UrlValidationError) cause) or a 304
    ///   arrives with nothing cached ([`ParseFailure`] cause)
    ///
    /// Problems with individual episodes or chapter documents never fail the call.
    pub async fn parse_feed(&self, url: &str) -> Result<ParsedFeed, FeedError> {
        // SEC-015: SSRF screening before any request
        validate_url(url, self.allow_private_hosts).map_err(|e| FeedError::feed_parse(url, e))?;

        let stale = match self.cache.lookup(url) {
            CacheLookup::Fresh(entry) => {
                tracing::debug!(url = %url, "Feed cache hit");
                return Ok(entry.feed);
            }
            CacheLookup::Stale(entry) => Some(entry),
            CacheLookup::Miss => {
                tracing::debug!(url = %url, "Feed cache miss");
                None
            }
        };

        let conditional = stale
            .as_ref()
            .map(CachedFeed::conditional_headers)
            .unwrap_or_default();
        let fetched_at = Utc::now();
        let response = self.fetcher.fetch(url, &conditional).await?;

        if response.is_not_modified() {
            let entry = stale
                .ok_or_else(|| FeedError::feed_parse(url, ParseFailure::NotModifiedWithoutCache))?;
            let etag = response.etag.or(entry.etag);
            let last_modified = response.last_modified.or(entry.last_modified);

            let mut feed = entry.feed;
            feed.etag = etag.clone();
            feed.last_modified = last_modified.clone();

            tracing::debug!(url = %url, "Feed not modified, serving cached copy");
            self.cache.set_at(url, feed.clone(), etag, last_modified, fetched_at);
            return Ok(feed);
        }

        let body = String::from_utf8_lossy(&response.data);
        let tree = xml::parse(&body, url)?;
        let mut feed = normalize(&tree, url, &response, fetched_at);
        self.chapters.resolve_all(&mut feed.episodes).await;

        tracing::info!(
            url = %url,
            episodes = feed.episodes.len(),
            skipped = tree.items.len().saturating_sub(feed.episodes.len()),
            "Parsed feed"
        );

        self.cache.set_at(
            url,
            feed.clone(),
            response.etag.clone(),
            response.last_modified.clone(),
            fetched_at,
        );
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::cache::DEFAULT_MAX_AGE;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parser(cache: Arc<FeedCache>) -> FeedParser {
        let config = ParserConfig {
            allow_private_hosts: true,
            retry_base_delay_ms: 10,
            ..ParserConfig::default()
        };
        FeedParser::new(&config, cache).unwrap()
    }

    #[tokio::test]
    async fn test_private_feed_url_rejected_by_default() {
        let cache = Arc::new(FeedCache::default());
        let parser = FeedParser::new(&ParserConfig::default(), cache).unwrap();
        match parser.parse_feed("http://localhost:8080/feed.xml").await {
            Err(FeedError::FeedParse { source, .. }) => {
                assert!(source.to_string().to_lowercase().contains("localhost"));
            }
            other => panic!("Expected FeedParse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_modified_without_cache_is_feed_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(304))
            .expect(1)
            .mount(&server)
            .await;

        let parser = parser(Arc::new(FeedCache::new(DEFAULT_MAX_AGE)));
        match parser.parse_feed(&server.uri()).await {
            Err(FeedError::FeedParse { source, .. }) => {
                assert!(source.downcast_ref::<ParseFailure>().is_some());
            }
            other => panic!("Expected FeedParse, got {:?}", other),
        }
    }
}
