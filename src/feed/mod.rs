//! Podcast feed ingestion.
//!
//! - **Fetching**: conditional GET with bounded retry for transport failures
//! - **Caching**: in-memory ETag/Last-Modified cache with a freshness window
//! - **Parsing**: RSS document to raw tree, then to canonical records
//! - **Chapters**: Podcast 2.0 chapters documents with a shownote fallback
//! - **Validation**: error/warning classification of a parsed feed
//!
//! # Architecture
//!
//! - [`xml`] - RSS text to [`RawFeedTree`](xml::RawFeedTree) using `quick-xml`
//! - [`normalize`] - raw tree to [`ParsedFeed`], field by field
//! - [`chapters`] - chapter extraction and the bounded fetch pool
//! - [`fetcher`] - HTTP client setup and the retrying fetch
//! - [`cache`] - the shared [`FeedCache`]
//! - [`parser`] - [`FeedParser`], composing all of the above
//! - [`validator`] - [`validate_feed`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use podfeed::feed::{validate_feed, FeedCache, FeedParser};
//! use podfeed::ParserConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ParserConfig::default();
//! let cache = Arc::new(FeedCache::new(config.cache_max_age()));
//! let parser = FeedParser::new(&config, cache)?;
//!
//! let feed = parser.parse_feed("https://example.com/feed.xml").await?;
//! let report = validate_feed(&feed);
//! println!("{} episodes, valid: {}", feed.episodes.len(), report.is_valid);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chapters;
pub mod fetcher;
pub mod normalize;
pub mod parser;
pub mod types;
pub mod validator;
pub mod xml;

pub use cache::{CacheLookup, FeedCache};
pub use chapters::{ChapterError, ChapterResolver};
pub use fetcher::{FetchError, Fetcher};
pub use normalize::{normalize, EpisodeError};
pub use parser::{FeedParser, ParseFailure};
pub use types::{
    CacheStats, CachedFeed, ChapterSource, ConditionalHeaders, FeedResponse, ParsedChapter,
    ParsedEpisode, ParsedFeed, PodcastFunding, PodcastPerson,
};
pub use validator::{validate_feed, ValidationError, ValidationResult, ValidationWarning};
