//! Podcast feed ingestion core.
//!
//! Turns RSS 2.0 feeds with iTunes and Podcast 2.0 extensions, fetched from
//! untrusted sources, into canonical records that are safe to render:
//! conditional fetching with retry, caching, XML parsing, field normalization,
//! chapter extraction, HTML sanitization and validation.
//!
//! Start with [`FeedParser::parse_feed`] and [`validate_feed`].

pub mod config;
pub mod error;
pub mod feed;
pub mod util;

pub use config::{ConfigError, ParserConfig};
pub use error::FeedError;
pub use feed::{
    validate_feed, FeedCache, FeedParser, ParsedChapter, ParsedEpisode, ParsedFeed,
    ValidationResult,
};
