//! Normalizer: raw tree → canonical [`ParsedFeed`].
//!
//! Pure and synchronous. Chapter documents are resolved afterwards by
//! [`ChapterResolver`](super::chapters::ChapterResolver); here each episode only
//! records its `chapters_url`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::types::{FeedResponse, ParsedEpisode, ParsedFeed, PodcastFunding, PodcastPerson};
use super::xml::fields::{content, itunes, media, podcast};
use super::xml::{RawElement, RawFeedTree, RawNode};
use crate::util::{
    fallback_guid, html_to_text, http_url, normalize_category, parse_date, parse_duration,
    parse_explicit, parse_positive_number, sanitize_html, split_keywords, strip_control_chars,
};

/// Title used when the channel has none.
pub const UNTITLED_FEED: &str = "Untitled Podcast";

const DEFAULT_PERSON_ROLE: &str = "host";
const DEFAULT_PERSON_GROUP: &str = "cast";

/// Why a single `<item>` could not be turned into an episode.
#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("item has no child elements")]
    NotAnElement,

    #[error("item appears as a nested list")]
    NestedList,
}

/// Converts a parsed document into a [`ParsedFeed`].
///
/// Items are normalized independently: an item that fails is logged and
/// skipped, an item without a usable audio URL is dropped, and a later item
/// repeating an earlier GUID is dropped. Episode order follows the document.
pub fn normalize(
    tree: &RawFeedTree,
    url: &str,
    response: &FeedResponse,
    fetched_at: DateTime<Utc>,
) -> ParsedFeed {
    let channel = &tree.channel;

    let mut episodes: Vec<ParsedEpisode> = Vec::with_capacity(tree.items.len());
    let mut seen_guids: HashSet<String> = HashSet::new();

    for (index, item) in tree.items.iter().enumerate() {
        match normalize_episode(item, fetched_at) {
            Ok(Some(episode)) => {
                if !seen_guids.insert(episode.guid.clone()) {
                    tracing::warn!(
                        url = %url,
                        index = index,
                        guid = %episode.guid,
                        "Skipping episode with duplicate GUID"
                    );
                    continue;
                }
                episodes.push(episode);
            }
            Ok(None) => {
                tracing::debug!(url = %url, index = index, "Dropping item without audio");
            }
            Err(e) => {
                tracing::warn!(url = %url, index = index, error = %e, "Skipping malformed episode");
            }
        }
    }

    let image = resolve_image(channel, false)
        .or_else(|| episodes.iter().find_map(|ep| ep.episode_image.clone()));

    ParsedFeed {
        title: channel
            .child_text("title")
            .map(html_to_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED_FEED.to_owned()),
        description: channel
            .child_text("description")
            .or_else(|| channel.child_text(itunes::SUMMARY))
            .map(|html| html_to_text(&sanitize_html(html)))
            .unwrap_or_default(),
        url: url.to_owned(),
        link: http_url(channel.child_text("link")),
        image,
        author: channel
            .child_text(itunes::AUTHOR)
            .or_else(|| channel.child_text("managingEditor"))
            .and_then(plain_text),
        category: resolve_category(channel),
        language: channel.child_text("language").and_then(plain_text),
        copyright: channel.child_text("copyright").and_then(plain_text),
        last_build_date: channel.child_text("lastBuildDate").and_then(parse_date),
        explicit: channel.child_text(itunes::EXPLICIT).is_some_and(parse_explicit),
        funding: parse_funding(channel),
        persons: parse_persons(channel),
        license: channel.child_text(podcast::LICENSE).and_then(plain_text),
        trailer_url: channel
            .children_named(podcast::TRAILER)
            .iter()
            .find_map(|trailer| http_url(trailer.attr("url"))),
        new_feed_url: http_url(channel.child_text(itunes::NEW_FEED_URL)),
        episodes,
        etag: response.etag.clone(),
        last_modified: response.last_modified.clone(),
        fetched_at,
    }
}

/// Normalizes one `<item>`. `Ok(None)` means the item is not a playable episode.
fn normalize_episode(
    node: &RawNode,
    fetched_at: DateTime<Utc>,
) -> Result<Option<ParsedEpisode>, EpisodeError> {
    let item = match node {
        RawNode::Element(item) => item,
        RawNode::Text(_) => return Err(EpisodeError::NotAnElement),
        RawNode::List(_) => return Err(EpisodeError::NestedList),
    };

    let title = item
        .child_text("title")
        .map(html_to_text)
        .unwrap_or_default();

    let enclosure = item
        .children_named("enclosure")
        .iter()
        .find(|enclosure| http_url(enclosure.attr("url")).is_some());
    let audio_url = match enclosure
        .and_then(|enclosure| http_url(enclosure.attr("url")))
        .or_else(|| media_audio_url(item))
    {
        Some(audio_url) => audio_url,
        None => return Ok(None),
    };

    let published = item.child_text("pubDate").and_then(parse_date);

    let html_source = item
        .child_text(content::ENCODED)
        .or_else(|| item.child_text("description"))
        .or_else(|| item.child_text(itunes::SUMMARY))
        .unwrap_or_default();
    let description_html = sanitize_html(html_source);
    let description = html_to_text(&description_html);

    let duration = item
        .child_text(itunes::DURATION)
        .and_then(parse_duration)
        .or_else(|| {
            enclosure
                .and_then(|enclosure| enclosure.attr("length"))
                .and_then(parse_duration)
        });

    let guid = resolve_guid(item.child_text("guid"), &audio_url, &title, published);

    let transcript = item
        .children_named(podcast::TRANSCRIPT)
        .iter()
        .find(|transcript| http_url(transcript.attr("url")).is_some());

    Ok(Some(ParsedEpisode {
        guid,
        title,
        description,
        description_html,
        audio_type: enclosure
            .and_then(|enclosure| enclosure.attr("type"))
            .and_then(plain_text),
        audio_length: enclosure
            .and_then(|enclosure| enclosure.attr("length"))
            .and_then(|length| length.parse::<u64>().ok())
            .filter(|length| *length > 0),
        audio_url,
        pub_date: published.unwrap_or(fetched_at),
        duration,
        link: http_url(item.child_text("link")),
        episode_image: resolve_image(item, true),
        chapters: Vec::new(),
        chapters_url: item
            .child(podcast::CHAPTERS)
            .and_then(|chapters| http_url(chapters.attr("url"))),
        season: item.child_text(itunes::SEASON).and_then(parse_positive_number),
        episode_number: item.child_text(itunes::EPISODE).and_then(parse_positive_number),
        explicit: item.child_text(itunes::EXPLICIT).is_some_and(parse_explicit),
        keywords: item
            .child_text(itunes::KEYWORDS)
            .map(split_keywords)
            .unwrap_or_default(),
        transcript_url: transcript.and_then(|t| http_url(t.attr("url"))),
        transcript_type: transcript.and_then(|t| t.attr("type")).and_then(plain_text),
        funding: parse_funding(item),
        persons: parse_persons(item),
    }))
}

// ============================================================================
// Field Helpers
// ============================================================================

/// Trimmed text with control characters removed; `None` when nothing is left.
fn plain_text(raw: &str) -> Option<String> {
    let cleaned = strip_control_chars(raw);
    let trimmed = cleaned.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// Feed GUID if non-empty, else the audio URL, else a title/date slug.
fn resolve_guid(
    provided: Option<&str>,
    audio_url: &str,
    title: &str,
    published: Option<DateTime<Utc>>,
) -> String {
    if let Some(guid) = provided.and_then(plain_text) {
        return guid;
    }
    if !audio_url.trim().is_empty() {
        return audio_url.trim().to_owned();
    }
    fallback_guid(title, published)
}

/// `media:content` entries declared as audio.
fn media_audio_url(item: &RawElement) -> Option<String> {
    item.children_named(media::CONTENT)
        .iter()
        .filter(|content| {
            content.attr("medium") == Some("audio")
                || content.attr("type").is_some_and(|t| t.starts_with("audio/"))
        })
        .find_map(|content| http_url(content.attr("url")))
}

/// `<image>` → `itunes:image` → (episodes only) `media:thumbnail` / `media:content`.
fn resolve_image(element: &RawElement, include_media: bool) -> Option<String> {
    let image = element.child("image");
    let rss_image = image
        .and_then(|image| image.child("url"))
        .and_then(RawNode::text)
        .or_else(|| image.and_then(RawNode::text));

    let itunes_image = element.child(itunes::IMAGE);
    let itunes_href = itunes_image
        .and_then(|image| image.attr("href"))
        .or_else(|| itunes_image.and_then(RawNode::text));

    let found = http_url(rss_image).or_else(|| http_url(itunes_href));
    if found.is_some() || !include_media {
        return found;
    }

    element
        .children_named(media::THUMBNAIL)
        .iter()
        .find_map(|thumbnail| http_url(thumbnail.attr("url")))
        .or_else(|| {
            element
                .children_named(media::CONTENT)
                .iter()
                .filter(|content| {
                    content.attr("medium") == Some("image")
                        || content.attr("type").is_some_and(|t| t.starts_with("image/"))
                })
                .find_map(|content| http_url(content.attr("url")))
        })
}

/// `itunes:category text=".."`, falling back to a plain `<category>`.
fn resolve_category(channel: &RawElement) -> Option<String> {
    channel
        .children_named(itunes::CATEGORY)
        .iter()
        .find_map(|category| category.attr("text").or_else(|| category.text()))
        .or_else(|| channel.child_text("category"))
        .and_then(normalize_category)
        .and_then(|category| plain_text(&category))
}

fn parse_funding(element: &RawElement) -> Vec<PodcastFunding> {
    element
        .children_named(podcast::FUNDING)
        .iter()
        .filter_map(|funding| {
            let url = http_url(funding.attr("url"))?;
            Some(PodcastFunding {
                url,
                message: funding.text().and_then(plain_text),
            })
        })
        .collect()
}

fn parse_persons(element: &RawElement) -> Vec<PodcastPerson> {
    element
        .children_named(podcast::PERSON)
        .iter()
        .filter_map(|person| {
            let name = person.text().and_then(plain_text)?;
            Some(PodcastPerson {
                name,
                role: person
                    .attr("role")
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| DEFAULT_PERSON_ROLE.to_owned()),
                group: person
                    .attr("group")
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| DEFAULT_PERSON_GROUP.to_owned()),
                image: http_url(person.attr("img")),
                href: http_url(person.attr("href")),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::chapters::parse_shownote_chapters;
    use crate::feed::xml;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use reqwest::header::HeaderMap;

    const URL: &str = "https://example.com/feed.xml";

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn response() -> FeedResponse {
        FeedResponse {
            data: Vec::new(),
            status: 200,
            headers: HeaderMap::new(),
            etag: Some("\"v1\"".to_owned()),
            last_modified: Some("Sat, 01 Jun 2024 10:00:00 GMT".to_owned()),
        }
    }

    fn normalize_xml(channel_body: &str) -> ParsedFeed {
        let doc = format!(
            r#"<rss version="2.0"
                xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
                xmlns:podcast="https://podcastindex.org/namespace/1.0"
                xmlns:media="http://search.yahoo.com/mrss/"
                xmlns:content="http://purl.org/rss/1.0/modules/content/">
              <channel>{channel_body}</channel></rss>"#
        );
        let tree = xml::parse(&doc, URL).unwrap();
        normalize(&tree, URL, &response(), fetched_at())
    }

    #[test]
    fn test_full_feed_normalization() {
        let feed = normalize_xml(
            r#"
            <title>Rust Radio</title>
            <description>&lt;p&gt;All about &lt;b&gt;Rust&lt;/b&gt;&lt;/p&gt;</description>
            <link>https://rust.example</link>
            <language>en-us</language>
            <itunes:author>Ferris</itunes:author>
            <itunes:category text="Technology &amp;amp; Science"/>
            <itunes:explicit>yes</itunes:explicit>
            <itunes:image href="https://rust.example/cover.png"/>
            <podcast:funding url="https://rust.example/donate">Support us</podcast:funding>
            <podcast:funding>No URL</podcast:funding>
            <podcast:person role="Host" img="https://rust.example/f.png">Ferris</podcast:person>
            <podcast:person role="guest"></podcast:person>
            <podcast:trailer url="https://rust.example/trailer.mp3">Trailer</podcast:trailer>
            <itunes:new-feed-url>https://new.example/feed</itunes:new-feed-url>
            <item>
              <title>Episode 1</title>
              <guid>ep-1</guid>
              <pubDate>Mon, 15 Jan 2024 10:30:00 +0000</pubDate>
              <enclosure url="https://rust.example/1.mp3" type="audio/mpeg" length="5000"/>
              <itunes:duration>01:02:03</itunes:duration>
              <itunes:season>2</itunes:season>
              <itunes:episode>7</itunes:episode>
              <itunes:keywords>rust, async, rust</itunes:keywords>
              <podcast:chapters url="https://rust.example/1.json" type="application/json+chapters"/>
              <podcast:transcript url="https://rust.example/1.vtt" type="text/vtt"/>
            </item>"#,
        );

        assert_eq!(feed.title, "Rust Radio");
        assert_eq!(feed.description, "All about Rust");
        assert_eq!(feed.link.as_deref(), Some("https://rust.example"));
        assert_eq!(feed.image.as_deref(), Some("https://rust.example/cover.png"));
        assert_eq!(feed.author.as_deref(), Some("Ferris"));
        assert_eq!(feed.category.as_deref(), Some("Technology & Science"));
        assert!(feed.explicit);
        assert_eq!(
            feed.funding,
            vec![PodcastFunding {
                url: "https://rust.example/donate".to_owned(),
                message: Some("Support us".to_owned()),
            }]
        );
        assert_eq!(feed.persons.len(), 1);
        assert_eq!(feed.persons[0].role, "host");
        assert_eq!(feed.persons[0].group, "cast");
        assert_eq!(feed.trailer_url.as_deref(), Some("https://rust.example/trailer.mp3"));
        assert_eq!(feed.new_feed_url.as_deref(), Some("https://new.example/feed"));
        assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
        assert_eq!(feed.fetched_at, fetched_at());

        let ep = &feed.episodes[0];
        assert_eq!(ep.guid, "ep-1");
        assert_eq!(ep.audio_url, "https://rust.example/1.mp3");
        assert_eq!(ep.audio_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(ep.audio_length, Some(5000));
        assert_eq!(ep.duration, Some(3723));
        assert_eq!(ep.season, Some(2));
        assert_eq!(ep.episode_number, Some(7));
        assert_eq!(ep.keywords, vec!["rust".to_owned(), "async".to_owned()]);
        assert_eq!(ep.chapters_url.as_deref(), Some("https://rust.example/1.json"));
        assert_eq!(ep.transcript_url.as_deref(), Some("https://rust.example/1.vtt"));
        assert_eq!(ep.transcript_type.as_deref(), Some("text/vtt"));
        assert_eq!(
            ep.pub_date,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
        );
        assert!(ep.chapters.is_empty());
    }

    #[test]
    fn test_missing_title_defaults() {
        let feed = normalize_xml("<description>x</description>");
        assert_eq!(feed.title, UNTITLED_FEED);
        assert!(feed.episodes.is_empty());
    }

    #[test]
    fn test_empty_guid_falls_back_to_audio_url() {
        let feed = normalize_xml(
            r#"<item><title>A</title><guid></guid><enclosure url="https://x/a.mp3"/></item>"#,
        );
        assert_eq!(feed.episodes[0].guid, "https://x/a.mp3");
    }

    #[test]
    fn test_resolve_guid_chain() {
        let date = Some(Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap());
        assert_eq!(resolve_guid(Some(" id-1 "), "https://x/a.mp3", "T", date), "id-1");
        assert_eq!(resolve_guid(Some("  "), "https://x/a.mp3", "T", date), "https://x/a.mp3");
        assert_eq!(resolve_guid(None, "", "My Show: Ep 3!", date), "my-show-ep-3-2024-03-09");
        assert_eq!(resolve_guid(None, "", "My Show", None), "my-show-unknown");
    }

    #[test]
    fn test_item_without_title_or_enclosure_dropped() {
        let feed = normalize_xml(
            r#"<item><description>orphan</description></item>
               <item><title>Kept</title><enclosure url="https://x/b.mp3"/></item>"#,
        );
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(feed.episodes[0].title, "Kept");
    }

    #[test]
    fn test_item_with_title_but_no_audio_dropped() {
        let feed = normalize_xml(
            r#"<item><title>Blog post</title><enclosure url="javascript:alert(1)"/></item>"#,
        );
        assert!(feed.episodes.is_empty());
    }

    #[test]
    fn test_malformed_item_skipped_feed_still_parses() {
        let feed = normalize_xml(
            r#"<item>just text</item>
               <item><title>Good</title><enclosure url="https://x/g.mp3"/></item>"#,
        );
        assert_eq!(feed.episodes.len(), 1);
        assert_eq!(feed.episodes[0].title, "Good");
    }

    #[test]
    fn test_duplicate_guid_first_occurrence_wins() {
        let feed = normalize_xml(
            r#"<item><title>First</title><guid>same</guid><enclosure url="https://x/1.mp3"/></item>
               <item><title>Second</title><guid>same</guid><enclosure url="https://x/2.mp3"/></item>
               <item><title>Third</title><guid>other</guid><enclosure url="https://x/3.mp3"/></item>"#,
        );
        let titles: Vec<&str> = feed.episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Third"]);
    }

    #[test]
    fn test_unparseable_pub_date_uses_fetch_time() {
        let feed = normalize_xml(
            r#"<item><title>A</title><pubDate>sometime</pubDate><enclosure url="https://x/a.mp3"/></item>"#,
        );
        assert_eq!(feed.episodes[0].pub_date, fetched_at());
    }

    #[test]
    fn test_duration_falls_back_to_enclosure_length() {
        let feed = normalize_xml(
            r#"<item><title>A</title><itunes:duration>n/a</itunes:duration>
               <enclosure url="https://x/a.mp3" length="1800"/></item>"#,
        );
        assert_eq!(feed.episodes[0].duration, Some(1800));
    }

    #[test]
    fn test_show_notes_sanitized() {
        let feed = normalize_xml(
            r#"<item><title>A</title><enclosure url="https://x/a.mp3"/>
               <description>ignored</description>
               <content:encoded><![CDATA[<p onclick="x()">Hi <script>alert(1)</script><a href="javascript:evil()">there</a></p>]]></content:encoded>
               </item>"#,
        );
        let ep = &feed.episodes[0];
        assert!(!ep.description_html.contains("script"));
        assert!(!ep.description_html.contains("onclick"));
        assert!(!ep.description_html.contains("javascript:"));
        assert!(ep.description_html.contains("<p>"));
        assert_eq!(ep.description, "Hi there");
    }

    #[test]
    fn test_image_precedence_and_feed_fallback() {
        let feed = normalize_xml(
            r#"<item><title>A</title><enclosure url="https://x/a.mp3"/>
                 <media:thumbnail url="https://x/thumb.jpg"/>
               </item>
               <item><title>B</title><enclosure url="https://x/b.mp3"/>
                 <itunes:image href="not a url"/>
                 <image><url>https://x/rss.jpg</url></image>
               </item>"#,
        );
        assert_eq!(feed.episodes[0].episode_image.as_deref(), Some("https://x/thumb.jpg"));
        assert_eq!(feed.episodes[1].episode_image.as_deref(), Some("https://x/rss.jpg"));
        assert_eq!(feed.image.as_deref(), Some("https://x/thumb.jpg"));
    }

    #[test]
    fn test_feed_rss_image_beats_itunes_image() {
        let feed = normalize_xml(
            r#"<itunes:image href="https://x/itunes.jpg"/>
               <image><url>https://x/rss.jpg</url><title>T</title></image>
               <item><title>A</title><enclosure url="https://x/a.mp3"/>
                 <itunes:image href="https://x/ep.jpg"/>
               </item>"#,
        );
        assert_eq!(feed.image.as_deref(), Some("https://x/rss.jpg"));
        assert_eq!(feed.episodes[0].episode_image.as_deref(), Some("https://x/ep.jpg"));
    }

    #[test]
    fn test_unescaped_show_notes_kept() {
        let feed = normalize_xml(
            r#"<item><title>A</title><enclosure url="https://x/a.mp3"/>
                 <description><p>00:00 Intro</p><p>05:00 Main</p></description>
               </item>"#,
        );
        let ep = &feed.episodes[0];
        assert_eq!(ep.description_html, "<p>00:00 Intro</p><p>05:00 Main</p>");
        assert!(ep.description.contains("00:00 Intro"));
        assert!(ep.description.contains("05:00 Main"));

        let chapters = parse_shownote_chapters(&ep.description_html);
        let titles: Vec<(&str, f64)> = chapters
            .iter()
            .map(|c| (c.title.as_str(), c.start_time))
            .collect();
        assert_eq!(titles, vec![("Intro", 0.0), ("Main", 300.0)]);
    }

    #[test]
    fn test_media_content_audio_used_without_enclosure() {
        let feed = normalize_xml(
            r#"<item><title>A</title>
                 <media:content url="https://x/cover.jpg" medium="image"/>
                 <media:content url="https://x/a.m4a" type="audio/mp4"/>
               </item>"#,
        );
        let ep = &feed.episodes[0];
        assert_eq!(ep.audio_url, "https://x/a.m4a");
        assert_eq!(ep.episode_image.as_deref(), Some("https://x/cover.jpg"));
    }

    #[test]
    fn test_control_characters_stripped_from_text() {
        let feed = normalize_xml(
            "<title>Evil\u{1b}[31m Show</title><item><title>Ep\u{7}</title><enclosure url=\"https://x/a.mp3\"/></item>",
        );
        assert_eq!(feed.title, "Evil Show");
        assert_eq!(feed.episodes[0].title, "Ep");
    }
}
