use thiserror::Error;

use crate::util::truncate_chars;

/// Maximum number of characters of a failing document kept in [`FeedError::XmlParse`].
pub const XML_SNIPPET_CHARS: usize = 1000;

/// Boxed cause carried by [`FeedError::FeedParse`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by [`FeedParser::parse_feed`](crate::FeedParser::parse_feed).
///
/// Every variant carries the feed URL it originated from. Lower-layer errors
/// (`Network`, `XmlParse`) reach the caller unchanged, so "could not reach the
/// server" stays distinguishable from "the server sent garbage". `FeedParse`
/// is the catch-all for anything else at the orchestration boundary.
///
/// Per-episode problems are not represented here: they are logged and the
/// episode is skipped.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Transport failure after the retry budget, or an HTTP error status (no retry).
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        /// HTTP status when the server answered, `None` for transport failures
        status: Option<u16>,
        message: String,
    },

    /// The body could not be turned into an XML tree.
    #[error("XML parse error for {url}: {message}")]
    XmlParse {
        url: String,
        /// First [`XML_SNIPPET_CHARS`] characters of the document
        snippet: String,
        message: String,
    },

    /// Any other failure while producing a feed.
    #[error("Failed to parse feed {url}: {source}")]
    FeedParse {
        url: String,
        #[source]
        source: BoxError,
    },
}

impl FeedError {
    pub(crate) fn network(url: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        FeedError::Network {
            url: url.to_owned(),
            status,
            message: message.into(),
        }
    }

    pub(crate) fn xml_parse(url: &str, source_text: &str, message: impl Into<String>) -> Self {
        FeedError::XmlParse {
            url: url.to_owned(),
            snippet: truncate_chars(source_text, XML_SNIPPET_CHARS).to_owned(),
            message: message.into(),
        }
    }

    pub(crate) fn feed_parse(url: &str, source: impl Into<BoxError>) -> Self {
        FeedError::FeedParse {
            url: url.to_owned(),
            source: source.into(),
        }
    }

    /// URL of the feed that failed.
    pub fn url(&self) -> &str {
        match self {
            FeedError::Network { url, .. }
            | FeedError::XmlParse { url, .. }
            | FeedError::FeedParse { url, .. } => url,
        }
    }

    /// HTTP status code, when the failure was an HTTP error response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FeedError::Network { status, .. } => *status,
            FeedError::XmlParse { .. } | FeedError::FeedParse { .. } => None,
        }
    }
}
