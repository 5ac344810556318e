//! XML adapter: RSS document → raw tree.
//!
//! The tree keeps the loose shape feed markup actually has. An element is
//! turned into one of three [`RawNode`] variants:
//!
//! - `Text` when it has neither attributes nor child elements (`<title>x</title>`)
//! - `Element` when it has attributes or children (`<enclosure url=".."/>`)
//! - `List` when a name repeats under one parent (several `<podcast:person>`)
//!
//! Extension namespaces are canonicalized: whatever prefix a document binds to
//! the iTunes, Podcast 2.0, Media RSS or content-module URI, its elements are
//! keyed under `itunes:`, `podcast:`, `media:` and `content:` (see [`fields`]).

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use html_escape::decode_html_entities;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::FeedError;

/// SEC-003: Maximum element nesting depth accepted from a feed document.
const MAX_XML_DEPTH: usize = 64;

/// Fields holding HTML. When a feed writes their markup unescaped, the inner
/// source is kept as text instead of being split into child elements.
const HTML_FIELDS: &[&str] = &["description", fields::content::ENCODED, fields::itunes::SUMMARY];

/// Canonical keys for the extension fields the normalizer reads.
pub mod fields {
    /// iTunes namespace (`http://www.itunes.com/dtds/podcast-1.0.dtd`)
    pub mod itunes {
        pub const IMAGE: &str = "itunes:image";
        pub const CATEGORY: &str = "itunes:category";
        pub const AUTHOR: &str = "itunes:author";
        pub const SUMMARY: &str = "itunes:summary";
        pub const EXPLICIT: &str = "itunes:explicit";
        pub const DURATION: &str = "itunes:duration";
        pub const SEASON: &str = "itunes:season";
        pub const EPISODE: &str = "itunes:episode";
        pub const KEYWORDS: &str = "itunes:keywords";
        pub const NEW_FEED_URL: &str = "itunes:new-feed-url";
    }

    /// Podcast 2.0 namespace (`https://podcastindex.org/namespace/1.0`)
    pub mod podcast {
        pub const FUNDING: &str = "podcast:funding";
        pub const TRAILER: &str = "podcast:trailer";
        pub const LICENSE: &str = "podcast:license";
        pub const CHAPTERS: &str = "podcast:chapters";
        pub const TRANSCRIPT: &str = "podcast:transcript";
        pub const PERSON: &str = "podcast:person";
    }

    /// Media RSS namespace (`http://search.yahoo.com/mrss/`)
    pub mod media {
        pub const THUMBNAIL: &str = "media:thumbnail";
        pub const CONTENT: &str = "media:content";
    }

    /// RSS 1.0 content module (`http://purl.org/rss/1.0/modules/content/`)
    pub mod content {
        pub const ENCODED: &str = "content:encoded";
    }
}

/// Namespace URIs (scheme and trailing slash removed, lower-cased) and the
/// prefix their elements are keyed under.
const KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("www.itunes.com/dtds/podcast-1.0.dtd", "itunes"),
    ("podcastindex.org/namespace/1.0", "podcast"),
    (
        "github.com/podcastindex-org/podcast-namespace/blob/main/docs/1.0.md",
        "podcast",
    ),
    ("search.yahoo.com/mrss", "media"),
    ("purl.org/rss/1.0/modules/content", "content"),
];

/// A node of the raw feed tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RawNode {
    Text(String),
    List(Vec<RawNode>),
    Element(RawElement),
}

/// An element with attributes and/or child elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawElement {
    /// Character data directly inside the element (text and CDATA, joined)
    pub text: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub children: BTreeMap<String, RawNode>,
}

/// The parsed document: channel-level fields plus the items in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeedTree {
    /// `<channel>` with its `<item>` children moved to `items`
    pub channel: RawElement,
    pub items: Vec<RawNode>,
}

impl RawNode {
    /// The node as a slice: a `List`'s members, or the node itself.
    pub fn as_slice(&self) -> &[RawNode] {
        match self {
            RawNode::List(nodes) => nodes,
            RawNode::Text(_) | RawNode::Element(_) => std::slice::from_ref(self),
        }
    }

    /// First node of a `List`, or the node itself.
    pub fn first(&self) -> Option<&RawNode> {
        match self {
            RawNode::List(nodes) => nodes.first(),
            RawNode::Text(_) | RawNode::Element(_) => Some(self),
        }
    }

    /// Trimmed, non-empty character data of the (first) node.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            RawNode::Text(text) => Some(text.as_str()),
            RawNode::Element(element) => element.text.as_deref(),
            RawNode::List(nodes) => return nodes.iter().find_map(RawNode::text),
        };
        text.map(str::trim).filter(|t| !t.is_empty())
    }

    /// Trimmed, non-empty attribute of the (first) node.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            RawNode::Element(element) => element.attr(name),
            RawNode::Text(_) => None,
            RawNode::List(nodes) => nodes.first().and_then(|node| node.attr(name)),
        }
    }

    /// Child of the (first) node.
    pub fn child(&self, name: &str) -> Option<&RawNode> {
        match self {
            RawNode::Element(element) => element.child(name),
            RawNode::Text(_) => None,
            RawNode::List(nodes) => nodes.first().and_then(|node| node.child(name)),
        }
    }
}

impl RawElement {
    pub fn child(&self, name: &str) -> Option<&RawNode> {
        self.children.get(name)
    }

    /// Every child stored under `name`, in document order.
    pub fn children_named(&self, name: &str) -> &[RawNode] {
        match self.children.get(name) {
            Some(node) => node.as_slice(),
            None => &[],
        }
    }

    /// Trimmed, non-empty text of the child `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(RawNode::text)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn push_text(&mut self, text: &str) {
        self.text.get_or_insert_with(String::new).push_str(text);
    }

    fn insert_child(&mut self, name: String, node: RawNode) {
        match self.children.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(node);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                RawNode::List(nodes) => nodes.push(node),
                existing => {
                    let first = std::mem::replace(existing, RawNode::List(Vec::new()));
                    *existing = RawNode::List(vec![first, node]);
                }
            },
        }
    }

    /// Replaces parsed child elements with the raw markup they came from.
    fn keep_markup(&mut self, inner: &str) {
        let markup = inner.replace("<![CDATA[", "").replace("]]>", "");
        self.text = Some(markup);
        self.children.clear();
    }

    fn into_node(self) -> RawNode {
        if self.attrs.is_empty() && self.children.is_empty() {
            RawNode::Text(self.text.unwrap_or_default())
        } else {
            RawNode::Element(self)
        }
    }
}

fn normalize_namespace_uri(uri: &str) -> String {
    let lower = uri.trim().to_ascii_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    without_scheme.trim_end_matches('/').to_owned()
}

/// Prefix rewriting for one document, built from its `xmlns:*` declarations.
#[derive(Default)]
struct Namespaces {
    canonical: HashMap<String, &'static str>,
}

impl Namespaces {
    fn declare(&mut self, prefix: &str, uri: &str) {
        let uri = normalize_namespace_uri(uri);
        if let Some((_, canonical)) = KNOWN_NAMESPACES.iter().find(|(known, _)| *known == uri) {
            self.canonical.insert(prefix.to_owned(), canonical);
        }
    }

    fn resolve(&self, raw_name: &str) -> String {
        match raw_name.split_once(':') {
            Some((prefix, local)) => match self.canonical.get(prefix) {
                Some(canonical) => format!("{canonical}:{local}"),
                None => raw_name.to_owned(),
            },
            None => raw_name.to_owned(),
        }
    }
}

fn decode_value(raw: &[u8]) -> String {
    decode_html_entities(&String::from_utf8_lossy(raw)).into_owned()
}

/// Reads a start tag into an element, registering any namespace declarations first.
fn open_element(e: &BytesStart<'_>, namespaces: &mut Namespaces) -> (String, RawElement) {
    let mut element = RawElement::default();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(error = %err, "Skipping malformed XML attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = decode_value(&attr.value);
        if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.declare(prefix, &value);
        }
        element.attrs.insert(key, value);
    }

    let name = namespaces.resolve(&String::from_utf8_lossy(e.name().as_ref()));
    (name, element)
}

/// An element whose end tag has not been read yet.
struct OpenElement {
    name: String,
    element: RawElement,
    /// Byte offset just past the start tag
    content_start: usize,
}

fn offset<P: TryInto<usize>>(position: P) -> usize {
    position.try_into().unwrap_or(usize::MAX)
}

/// Source between `content_start` and the end tag that finishes at `content_end`.
fn inner_markup(document: &str, content_start: usize, content_end: usize) -> Option<&str> {
    let through_end_tag = document.get(content_start..content_end)?;
    let end_tag = through_end_tag.rfind("</")?;
    through_end_tag.get(..end_tag)
}

/// Parses an RSS document into a [`RawFeedTree`].
///
/// # Errors
///
/// [`FeedError::XmlParse`] when the text is not well-formed XML, nests deeper
/// than 64 levels, or has no `<rss><channel>` element. The error carries the
/// first 1000 characters of the document.
///
/// # Security
///
/// quick-xml (0.37) never expands `<!ENTITY>` declarations, and entity
/// references are decoded here against the fixed HTML entity table only, so
/// external-entity and entity-expansion attacks have nothing to act on.
pub fn parse(xml: &str, url: &str) -> Result<RawFeedTree, FeedError> {
    let document = xml.trim_start_matches('\u{feff}');
    if document.trim().is_empty() {
        return Err(FeedError::xml_parse(url, xml, "empty document"));
    }

    // No per-event trimming: text is trimmed after joining, in `RawNode::text`
    let mut reader = Reader::from_str(document);

    let mut namespaces = Namespaces::default();
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut root: Option<(String, RawNode)> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if stack.len() >= MAX_XML_DEPTH {
                    return Err(FeedError::xml_parse(
                        url,
                        xml,
                        format!("nesting depth exceeds maximum of {MAX_XML_DEPTH} levels"),
                    ));
                }
                let (name, element) = open_element(&e, &mut namespaces);
                stack.push(OpenElement {
                    name,
                    element,
                    content_start: offset(reader.buffer_position()),
                });
            }
            Ok(Event::Empty(e)) => {
                let (name, element) = open_element(&e, &mut namespaces);
                match stack.last_mut() {
                    Some(parent) => parent.element.insert_child(name, element.into_node()),
                    None => root = Some((name, element.into_node())),
                }
            }
            Ok(Event::End(_)) => {
                if let Some(mut open) = stack.pop() {
                    let unescaped_html = HTML_FIELDS.contains(&open.name.as_str())
                        && !open.element.children.is_empty();
                    if unescaped_html {
                        let content_end = offset(reader.buffer_position());
                        if let Some(inner) =
                            inner_markup(document, open.content_start, content_end)
                        {
                            open.element.keep_markup(inner);
                        }
                    }
                    let OpenElement { name, element, .. } = open;
                    match stack.last_mut() {
                        Some(parent) => parent.element.insert_child(name, element.into_node()),
                        None => root = Some((name, element.into_node())),
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(open) = stack.last_mut() {
                    open.element.push_text(&decode_value(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(open) = stack.last_mut() {
                    open.element.push_text(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::xml_parse(
                    url,
                    xml,
                    format!("{} (at byte {})", e, reader.buffer_position()),
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(FeedError::xml_parse(
            url,
            xml,
            format!("unexpected end of document inside <{}>", open.name),
        ));
    }

    let channel = match root {
        Some((name, RawNode::Element(mut rss))) if name == "rss" => rss.children.remove("channel"),
        _ => None,
    };
    let mut channel = match channel.as_ref().and_then(RawNode::first) {
        Some(RawNode::Element(channel)) => channel.clone(),
        _ => return Err(FeedError::xml_parse(url, xml, "document has no <rss><channel>")),
    };

    let items = channel
        .children
        .remove("item")
        .map(|node| node.as_slice().to_vec())
        .unwrap_or_default();

    Ok(RawFeedTree { channel, items })
}
