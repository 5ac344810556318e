//! Show-note HTML handling.
//!
//! Podcast descriptions are authored HTML from untrusted feeds. Two passes are
//! offered:
//!
//! - [`sanitize_html`] removes active content (scripts, frames, forms, event
//!   handlers, `javascript:` URIs) and otherwise leaves the markup as written,
//!   so show-note formatting survives.
//! - [`html_to_text`] drops every tag and decodes entities for plain-text fields,
//!   keeping line structure so timestamps at line starts stay detectable.

use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

use super::text::{collapse_whitespace, strip_control_chars};

/// Elements removed together with their content.
const BLOCKED_ELEMENTS: &[&str] = &[
    "script", "iframe", "object", "embed", "applet", "style", "link", "form", "input", "button",
    "textarea", "select", "frame", "frameset", "base", "meta", "title",
];

/// Blocked elements that never have content, so nothing after them is skipped.
const VOID_BLOCKED_ELEMENTS: &[&str] = &["embed", "link", "input", "frame", "base", "meta"];

/// Attributes removed from every element, in addition to `on*` handlers.
const BLOCKED_ATTRIBUTES: &[&str] = &["formaction", "action", "srcdoc", "data"];

/// Tags that end a line of text when extracted.
const LINE_BREAK_ELEMENTS: &[&str] = &[
    "br", "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "hr", "pre",
    "blockquote", "section", "article", "header", "footer", "table", "dt", "dd",
];

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*(/?)>"#,
    )
    .expect("tag pattern is valid")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*("[^"]*"|'[^']*'|[^\s"'>]+))?"#)
        .expect("attribute pattern is valid")
});

enum Token<'a> {
    Text(&'a str),
    Tag {
        name: &'a str,
        closing: bool,
        self_closing: bool,
        attrs: &'a str,
    },
}

/// Walks `input` as a flat tag/text stream. Comments and blocked elements
/// (including everything up to their closing tag) never reach `on_token`.
fn walk<'a>(input: &'a str, mut on_token: impl FnMut(Token<'a>)) {
    let lower = input.to_ascii_lowercase();
    let mut pos = 0;

    while let Some(caps) = TAG_RE.captures_at(input, pos) {
        let Some(whole) = caps.get(0) else { break };
        if whole.start() > pos {
            on_token(Token::Text(&input[pos..whole.start()]));
        }
        pos = whole.end();

        // Comments carry no name group
        let Some(name) = caps.get(2) else { continue };
        let name_lower = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());

        if BLOCKED_ELEMENTS.contains(&name_lower.as_str()) {
            if !closing && !self_closing && !VOID_BLOCKED_ELEMENTS.contains(&name_lower.as_str())
            {
                pos = skip_past_closing(&lower, pos, &name_lower);
            }
            continue;
        }

        on_token(Token::Tag {
            name: name.as_str(),
            closing,
            self_closing,
            attrs: caps.get(3).map_or("", |m| m.as_str()),
        });
    }

    if pos < input.len() {
        on_token(Token::Text(&input[pos..]));
    }
}

/// Returns the byte offset just past `</name ...>` at or after `from`,
/// or the end of input when the element is never closed.
fn skip_past_closing(lower: &str, from: usize, name: &str) -> usize {
    let needle = format!("</{name}");
    let mut search = from;

    while let Some(rel) = lower[search..].find(&needle) {
        let after_name = search + rel + needle.len();
        let boundary = lower[after_name..].chars().next();
        let at_tag_end = matches!(boundary, None | Some('>') | Some('/'))
            || boundary.is_some_and(char::is_whitespace);
        if at_tag_end {
            return match lower[after_name..].find('>') {
                Some(end) => after_name + end + 1,
                None => lower.len(),
            };
        }
        search = after_name;
    }

    lower.len()
}

fn is_blocked_attribute(name: &str) -> bool {
    name.starts_with("on") || BLOCKED_ATTRIBUTES.contains(&name)
}

/// Normalizes a URI attribute value for scheme checks: entities decoded,
/// whitespace and control characters removed, lower-cased.
fn uri_scheme_prefix(raw: &str) -> String {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(raw);
    decode_html_entities(unquoted)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn push_safe_attributes(out: &mut String, attrs: &str) {
    for caps in ATTR_RE.captures_iter(attrs) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        if is_blocked_attribute(&name) {
            continue;
        }

        if let Some(value) = caps.get(2) {
            let is_href = name == "href" || name.ends_with(":href");
            if is_href || name == "src" {
                let scheme = uri_scheme_prefix(value.as_str());
                if scheme.starts_with("javascript:") || scheme.starts_with("vbscript:") {
                    continue;
                }
                // Images may legitimately inline data: URIs, links may not
                if is_href && scheme.starts_with("data:") {
                    continue;
                }
            }
        }

        out.push(' ');
        out.push_str(whole.as_str());
    }
}

/// Removes active content from show-note HTML while keeping its formatting.
///
/// Blacklist model: the elements in `BLOCKED_ELEMENTS` are dropped with their
/// content, `on*` handlers and `formaction`/`action`/`srcdoc`/`data` attributes
/// are dropped from every element, `javascript:` URIs are dropped from `href`
/// and `src`, and `data:` URIs from `href`. Everything else passes through.
/// Comments are removed and stray `<` characters in text are escaped so that
/// fragments left around removed tags cannot re-form markup.
///
/// # Examples
///
/// ```
/// use podfeed::util::sanitize_html;
///
/// let clean = sanitize_html("<script>alert(1)</script><b>ok</b>");
/// assert_eq!(clean, "<b>ok</b>");
/// ```
pub fn sanitize_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    walk(input, |token| match token {
        Token::Text(text) => out.push_str(&text.replace('<', "&lt;")),
        Token::Tag {
            name,
            closing,
            self_closing,
            attrs,
        } => {
            out.push('<');
            if closing {
                out.push('/');
            }
            out.push_str(name);
            if !closing {
                push_safe_attributes(&mut out, attrs);
            }
            if self_closing {
                out.push('/');
            }
            out.push('>');
        }
    });

    out
}

/// Extracts readable plain text from HTML.
///
/// Every tag is removed; block-level tags and `<br>` become line breaks;
/// entities are decoded; whitespace inside a line is collapsed; blank lines
/// are dropped; control characters are stripped.
///
/// # Examples
///
/// ```
/// use podfeed::util::html_to_text;
///
/// assert_eq!(html_to_text("<p>Hello &amp; <b>welcome</b></p><p>Bye</p>"), "Hello & welcome\nBye");
/// ```
pub fn html_to_text(input: &str) -> String {
    let mut raw = String::with_capacity(input.len());

    walk(input, |token| match token {
        Token::Text(text) => raw.push_str(&decode_html_entities(text)),
        Token::Tag { name, .. } => {
            if LINE_BREAK_ELEMENTS.contains(&name.to_ascii_lowercase().as_str()) {
                raw.push('\n');
            }
        }
    });

    let lines: Vec<String> = raw
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect();

    strip_control_chars(&lines.join("\n")).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_removed_formatting_kept() {
        let out = sanitize_html("<script>alert(1)</script><b>ok</b>");
        assert!(out.contains("<b>ok</b>"));
        assert!(!out.to_lowercase().contains("<script"));
        assert!(!out.contains("alert"));
    }

    #[test]
    fn test_blocked_elements_removed_with_content() {
        let input = r#"<p>Intro</p><style>p{color:red}</style><iframe src="https://evil.example">x</iframe><form action="/x"><input name="a"><button>Go</button></form><p>End</p>"#;
        assert_eq!(sanitize_html(input), "<p>Intro</p><p>End</p>");
    }

    #[test]
    fn test_uppercase_and_unclosed_script() {
        assert_eq!(sanitize_html("<p>a</p><SCRIPT type=x>evil()"), "<p>a</p>");
        assert_eq!(sanitize_html("<ScRiPt>x</sCrIpT >after"), "after");
    }

    #[test]
    fn test_void_blocked_elements_do_not_swallow_content() {
        let input = r#"<meta charset="utf-8"><link rel="stylesheet" href="x.css"><p>Kept</p>"#;
        assert_eq!(sanitize_html(input), "<p>Kept</p>");
    }

    #[test]
    fn test_event_handlers_and_form_attributes_stripped() {
        let input = r#"<img src="a.png" onerror="alert(1)" ONLOAD='x()'><a href="/ok" formaction="/x" data="y" data-id="7">l</a>"#;
        assert_eq!(
            sanitize_html(input),
            r#"<img src="a.png"><a href="/ok" data-id="7">l</a>"#
        );
    }

    #[test]
    fn test_javascript_uris_stripped() {
        let input = r#"<a href="javascript:alert(1)">x</a><a href=" JaVa&#x53;cript:alert(1)">y</a><img src="javascript:x">"#;
        assert_eq!(sanitize_html(input), "<a>x</a><a>y</a><img>");
    }

    #[test]
    fn test_data_uri_only_allowed_in_src() {
        let input = r#"<a href="data:text/html,<b>">x</a><img src="data:image/png;base64,AAAA">"#;
        assert_eq!(
            sanitize_html(input),
            r#"<a>x</a><img src="data:image/png;base64,AAAA">"#
        );
    }

    #[test]
    fn test_stray_angle_brackets_cannot_reform_script() {
        let out = sanitize_html("<scr<script>x</script>ipt>alert(1)</script>");
        assert!(!out.to_lowercase().contains("<script"));
    }

    #[test]
    fn test_comments_removed_and_formatting_preserved() {
        let input = r#"<!-- hidden --><p class="notes"><a href="https://example.com" target="_blank">Link</a><br/>Line</p>"#;
        assert_eq!(
            sanitize_html(input),
            r#"<p class="notes"><a href="https://example.com" target="_blank">Link</a><br/>Line</p>"#
        );
    }

    #[test]
    fn test_html_to_text_keeps_lines() {
        let input = "<p>00:00 Intro</p><p>12:30 &ndash; Main topic</p><ul><li>one</li><li>two</li></ul>";
        assert_eq!(html_to_text(input), "00:00 Intro\n12:30 – Main topic\none\ntwo");
    }

    #[test]
    fn test_html_to_text_drops_script_content_and_controls() {
        assert_eq!(
            html_to_text("<script>var a = 1;</script>Hello\x1b[31m world"),
            "Hello world"
        );
    }

    #[test]
    fn test_html_to_text_plain_input() {
        assert_eq!(html_to_text("  just   text  "), "just text");
        assert_eq!(html_to_text(""), "");
    }
}
