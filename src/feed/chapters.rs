//! Chapter extraction.
//!
//! Two strategies, in priority order:
//!
//! 1. The Podcast 2.0 chapters document referenced by `podcast:chapters`
//!    (`{ "chapters": [{ "title", "startTime", "endTime"?, "img"?, "url"? }] }`),
//!    fetched once with its own timeout and size limit.
//! 2. Timestamp lines in the show notes, used only when (1) produced nothing,
//!    whether because the episode has no document or because fetching or
//!    decoding it failed.
//!
//! Whatever the source, chapters come back sorted by start time.

use std::sync::LazyLock;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use thiserror::Error;

use super::fetcher::{read_limited_bytes, FetchError};
use super::types::{ChapterSource, ParsedChapter, ParsedEpisode};
use crate::config::ParserConfig;
use crate::util::{html_to_text, http_url, strip_control_chars, validate_url, UrlValidationError};

const CHAPTERS_ACCEPT: &str = "application/json+chapters, application/json;q=0.9, */*;q=0.1";

/// `[H:]MM:SS` at the start of a line, optionally bracketed, then the title.
static TIMESTAMP_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\(\[]?(?:(\d{1,2}):)?(\d{1,2}):(\d{2})[\)\]]?(.*)$")
        .expect("timestamp regex is valid")
});

#[derive(Debug, Error)]
pub enum ChapterError {
    #[error("Chapters URL rejected: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid chapters JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Chapters JSON
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChaptersDocument {
    #[serde(default)]
    chapters: Vec<JsonChapter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonChapter {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    start_time: Option<Seconds>,
    #[serde(default)]
    end_time: Option<Seconds>,
    #[serde(default)]
    img: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Times are numbers per the namespace, but numeric strings show up too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(f64),
    Text(String),
}

impl Seconds {
    fn value(&self) -> Option<f64> {
        let value = match self {
            Seconds::Number(n) => *n,
            Seconds::Text(s) => s.trim().parse().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// Decodes a chapters document, keeping entries with a non-empty title and a
/// non-negative start time.
pub fn parse_chapters_json(bytes: &[u8]) -> Result<Vec<ParsedChapter>, serde_json::Error> {
    let document: ChaptersDocument = serde_json::from_slice(bytes)?;

    let mut chapters: Vec<ParsedChapter> = document
        .chapters
        .into_iter()
        .filter_map(|entry| {
            let title = strip_control_chars(entry.title.as_deref()?).trim().to_owned();
            let start_time = entry.start_time.as_ref()?.value()?;
            if title.is_empty() || start_time < 0.0 {
                return None;
            }
            Some(ParsedChapter {
                title,
                start_time,
                end_time: entry
                    .end_time
                    .as_ref()
                    .and_then(Seconds::value)
                    .filter(|end| *end >= start_time),
                image: http_url(entry.img.as_deref()),
                url: http_url(entry.url.as_deref()),
                source: ChapterSource::Json,
            })
        })
        .collect();

    sort_chapters(&mut chapters);
    Ok(chapters)
}

// ============================================================================
// Shownote Timestamps
// ============================================================================

fn is_title_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, '-' | '\u{2013}' | '\u{2014}' | ':' | '|' | '.' | '>')
}

/// Scans show notes for lines starting with `(HH:)?MM:SS`.
///
/// The HTML is reduced to text first, so each paragraph, list item or `<br>`
/// separated line is considered on its own. A separator between timestamp and
/// title (`00:00 - Intro`) is dropped; lines with no title left are ignored.
pub fn parse_shownote_chapters(description_html: &str) -> Vec<ParsedChapter> {
    let text = html_to_text(description_html);

    let mut chapters: Vec<ParsedChapter> = text
        .lines()
        .filter_map(|line| {
            let caps = TIMESTAMP_LINE_RE.captures(line.trim())?;
            let hours: u64 = caps.get(1).map_or(Ok(0), |h| h.as_str().parse()).ok()?;
            let minutes: u64 = caps.get(2)?.as_str().parse().ok()?;
            let seconds: u64 = caps.get(3)?.as_str().parse().ok()?;
            if seconds >= 60 || (caps.get(1).is_some() && minutes >= 60) {
                return None;
            }

            let title = caps
                .get(4)
                .map_or("", |t| t.as_str())
                .trim_start_matches(is_title_separator)
                .trim();
            if title.is_empty() {
                return None;
            }

            Some(ParsedChapter {
                title: title.to_owned(),
                start_time: (hours * 3600 + minutes * 60 + seconds) as f64,
                end_time: None,
                image: None,
                url: None,
                source: ChapterSource::Shownote,
            })
        })
        .collect();

    sort_chapters(&mut chapters);
    chapters
}

/// Stable ascending sort by start time.
pub fn sort_chapters(chapters: &mut [ParsedChapter]) {
    chapters.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
}

// ============================================================================
// Resolver
// ============================================================================

/// Fills in episode chapters, fetching chapter documents through a bounded pool.
#[derive(Debug, Clone)]
pub struct ChapterResolver {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    max_bytes: usize,
    concurrency: usize,
    allow_private_hosts: bool,
}

impl ChapterResolver {
    pub fn new(client: reqwest::Client, config: &ParserConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            timeout: config.chapters_timeout(),
            max_bytes: config.chapters_max_bytes,
            concurrency: config.chapter_fetch_concurrency.max(1),
            allow_private_hosts: config.allow_private_hosts,
        }
    }

    /// Fetches and decodes one chapters document. Single attempt, no retry.
    pub async fn fetch_json(&self, url: &str) -> Result<Vec<ParsedChapter>, ChapterError> {
        let validated = validate_url(url, self.allow_private_hosts)?;

        let request = async {
            let response = self
                .client
                .get(validated.as_str())
                .header(USER_AGENT, self.user_agent.as_str())
                .header(ACCEPT, CHAPTERS_ACCEPT)
                .send()
                .await?;
            if response.status().as_u16() >= 400 {
                return Err(FetchError::HttpStatus(response.status().as_u16()));
            }
            read_limited_bytes(response, self.max_bytes).await
        };

        let bytes = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;

        Ok(parse_chapters_json(&bytes)?)
    }

    /// Chapters for one episode: the JSON document when it yields any, else shownotes.
    pub async fn resolve(&self, episode: &ParsedEpisode) -> Vec<ParsedChapter> {
        let from_json = match &episode.chapters_url {
            Some(url) => match self.fetch_json(url).await {
                Ok(chapters) => chapters,
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        guid = %episode.guid,
                        error = %e,
                        "Failed to load chapters document"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        if !from_json.is_empty() {
            return from_json;
        }

        let from_notes = parse_shownote_chapters(&episode.description_html);
        if !from_notes.is_empty() {
            tracing::debug!(
                guid = %episode.guid,
                count = from_notes.len(),
                "Using shownote chapters"
            );
        }
        from_notes
    }

    /// Resolves chapters for every episode. Episode order is untouched.
    pub async fn resolve_all(&self, episodes: &mut [ParsedEpisode]) {
        let resolved: Vec<(usize, Vec<ParsedChapter>)> = stream::iter(episodes.iter().enumerate())
            .map(|(index, episode)| async move { (index, self.resolve(episode).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (index, chapters) in resolved {
            if let Some(episode) = episodes.get_mut(index) {
                episode.chapters = chapters;
            }
        }
    }
}
