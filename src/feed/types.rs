use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Canonical Feed Records
// ============================================================================

/// A normalized podcast feed, safe to render and store.
///
/// Produced by [`FeedParser::parse_feed`](crate::FeedParser::parse_feed).
/// Values handed to callers are owned snapshots; the cache keeps its own copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFeed {
    /// Channel title, `"Untitled Podcast"` when the feed has none
    pub title: String,
    /// Plain-text channel description (empty when absent)
    pub description: String,
    /// URL the feed was requested from
    pub url: String,
    /// Website link from `<link>`
    pub link: Option<String>,
    /// Display image, falling back to the first episode image
    pub image: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub language: Option<String>,
    pub copyright: Option<String>,
    pub last_build_date: Option<DateTime<Utc>>,
    /// `itunes:explicit` at channel level
    pub explicit: bool,
    /// Channel-level `podcast:funding` entries
    pub funding: Vec<PodcastFunding>,
    /// Channel-level `podcast:person` entries
    pub persons: Vec<PodcastPerson>,
    /// `podcast:license` text
    pub license: Option<String>,
    /// First `podcast:trailer` URL
    pub trailer_url: Option<String>,
    /// `itunes:new-feed-url`, announced when a feed moves
    pub new_feed_url: Option<String>,
    /// Episodes in document order
    pub episodes: Vec<ParsedEpisode>,
    /// ETag validator from the response that produced this feed
    pub etag: Option<String>,
    /// Last-Modified validator from the response that produced this feed
    pub last_modified: Option<String>,
    /// When the producing response was fetched
    pub fetched_at: DateTime<Utc>,
}

/// A single normalized episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEpisode {
    /// Feed GUID, else the audio URL, else a title/date slug. Never empty.
    pub guid: String,
    /// Episode title (empty when the item has none)
    pub title: String,
    /// Plain-text description
    pub description: String,
    /// Sanitized HTML show notes
    pub description_html: String,
    /// Enclosure URL; episodes without one are never emitted
    pub audio_url: String,
    /// Enclosure MIME type
    pub audio_type: Option<String>,
    /// Enclosure length attribute in bytes
    pub audio_length: Option<u64>,
    /// Publication date, or the fetch time when the feed's date is unusable
    pub pub_date: DateTime<Utc>,
    /// Duration in seconds
    pub duration: Option<u64>,
    pub link: Option<String>,
    pub episode_image: Option<String>,
    /// Sorted ascending by `start_time`
    pub chapters: Vec<ParsedChapter>,
    /// `podcast:chapters` JSON reference, if the item has one
    pub chapters_url: Option<String>,
    pub season: Option<u32>,
    pub episode_number: Option<u32>,
    pub explicit: bool,
    /// Distinct keywords in first-seen order
    pub keywords: Vec<String>,
    pub transcript_url: Option<String>,
    pub transcript_type: Option<String>,
    pub funding: Vec<PodcastFunding>,
    pub persons: Vec<PodcastPerson>,
}

/// Where a chapter marker came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterSource {
    /// Podcast 2.0 chapters document
    Json,
    /// Embedded audio metadata (produced by consumers that read ID3 frames)
    Id3,
    /// Timestamp lines in the show notes
    Shownote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedChapter {
    pub title: String,
    /// Seconds from the start of the episode, never negative
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub image: Option<String>,
    pub url: Option<String>,
    pub source: ChapterSource,
}

/// A `podcast:funding` entry. Entries without a usable URL are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastFunding {
    pub url: String,
    /// Call-to-action text from the element body
    pub message: Option<String>,
}

/// A `podcast:person` entry. Entries without a name are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastPerson {
    pub name: String,
    /// Defaults to `host` per the namespace
    pub role: String,
    /// Defaults to `cast` per the namespace
    pub group: String,
    pub image: Option<String>,
    pub href: Option<String>,
}

// ============================================================================
// Fetch and Cache Records
// ============================================================================

/// Validators offered upstream for a conditional GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalHeaders {
    /// Sent as `If-None-Match`
    pub if_none_match: Option<String>,
    /// Sent as `If-Modified-Since`
    pub if_modified_since: Option<String>,
}

impl ConditionalHeaders {
    pub fn is_empty(&self) -> bool {
        self.if_none_match.is_none() && self.if_modified_since.is_none()
    }
}

/// A non-failing HTTP response (status < 400 or 304).
#[derive(Debug, Clone)]
pub struct FeedResponse {
    /// Response body; empty for 304
    pub data: Vec<u8>,
    pub status: u16,
    pub headers: HeaderMap,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl FeedResponse {
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

/// A cache entry: the feed plus the validators that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedFeed {
    pub feed: ParsedFeed,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub urls: Vec<String>,
}
