//! Coercion of loosely formatted feed fields into typed values.
//!
//! Every function here is total: malformed input yields `None` (or an empty
//! collection), never an error, because a single bad field must not cost the
//! episode that carries it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Zone-less layouts seen in the wild, interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%a, %d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

/// Zoned layouts that are neither RFC 2822 nor RFC 3339.
const ZONED_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%a, %d %b %Y %H:%M %z"];

/// Parses an episode duration into whole seconds.
///
/// Accepts `HH:MM:SS`, `MM:SS` and bare seconds (fractional seconds are
/// truncated). Colon-separated parts are read right to left as seconds,
/// minutes, hours. Zero, negative, or unparseable input yields `None`.
///
/// ```
/// use podfeed::util::parse_duration;
///
/// assert_eq!(parse_duration("01:02:03"), Some(3723));
/// assert_eq!(parse_duration("02:03"), Some(123));
/// assert_eq!(parse_duration("45"), Some(45));
/// assert_eq!(parse_duration("0"), None);
/// assert_eq!(parse_duration("-12"), None);
/// ```
pub fn parse_duration(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    let mut total = 0f64;
    for (position, part) in parts.iter().rev().enumerate() {
        let value: f64 = part.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        total += value * 60f64.powi(position as i32);
    }

    let seconds = total.floor();
    (seconds >= 1.0).then_some(seconds as u64)
}

/// Parses a feed date (`pubDate`, `lastBuildDate`) into UTC.
///
/// Tries RFC 2822, RFC 3339, RFC 2822 with the weekday removed (feeds often
/// carry a weekday that does not match the date), then a few zoned and zone-less
/// layouts. Anything else yields `None`.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Some((_, without_weekday)) = s.split_once(',') {
        if let Ok(dt) = DateTime::parse_from_rfc2822(without_weekday.trim()) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Lower-cases `s` and collapses every run of non-alphanumeric characters
/// into a single `-`, with no leading or trailing dash.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;

    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }

    out
}

/// Builds the last-resort episode GUID from its title and publication date.
///
/// ```
/// use podfeed::util::fallback_guid;
///
/// assert_eq!(fallback_guid("Episode 1: Hello!", None), "episode-1-hello-unknown");
/// ```
pub fn fallback_guid(title: &str, published: Option<DateTime<Utc>>) -> String {
    let date_part = published
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_owned());
    slugify(&format!("{title}-{date_part}"))
}

/// Interprets `itunes:explicit` values.
pub fn parse_explicit(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "explicit"
    )
}

/// Parses season and episode numbers; zero and garbage yield `None`.
pub fn parse_positive_number(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Splits a comma-separated keyword list, trimming entries and dropping empty
/// and repeated ones. First-seen order is kept.
pub fn split_keywords(raw: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for keyword in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keywords.iter().any(|existing| existing == keyword) {
            keywords.push(keyword.to_owned());
        }
    }
    keywords
}

/// Cleans an `itunes:category` value: drops an `iTunes` prefix and unescapes
/// a doubly-escaped `&amp;`.
pub fn normalize_category(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let without_prefix = match trimmed.strip_prefix("iTunes") {
        Some(rest) => rest.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '-' | '>' | '/' | '|')
        }),
        None => trimmed,
    };
    let category = without_prefix.replace("&amp;", "&");
    let category = category.trim();
    (!category.is_empty()).then(|| category.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_duration_formats() {
        assert_eq!(parse_duration("01:02:03"), Some(3723));
        assert_eq!(parse_duration("02:03"), Some(123));
        assert_eq!(parse_duration("45"), Some(45));
        assert_eq!(parse_duration(" 1:00:00 "), Some(3600));
        assert_eq!(parse_duration("90.7"), Some(90));
    }

    #[test]
    fn test_duration_rejects_zero_negative_and_garbage() {
        assert_eq!(parse_duration("0"), None);
        assert_eq!(parse_duration("00:00:00"), None);
        assert_eq!(parse_duration("-5"), None);
        assert_eq!(parse_duration("1:-5"), None);
        assert_eq!(parse_duration("abc"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("1:2:3:4"), None);
        assert_eq!(parse_duration("NaN"), None);
        assert_eq!(parse_duration("inf"), None);
    }

    proptest! {
        #[test]
        fn prop_duration_hms_matches_arithmetic(h in 0u64..100, m in 0u64..60, s in 0u64..60) {
            let expected = h * 3600 + m * 60 + s;
            let parsed = parse_duration(&format!("{h:02}:{m:02}:{s:02}"));
            if expected == 0 {
                prop_assert_eq!(parsed, None);
            } else {
                prop_assert_eq!(parsed, Some(expected));
            }
        }

        #[test]
        fn prop_duration_never_panics(raw in ".{0,24}") {
            let _ = parse_duration(&raw);
        }
    }

    #[test]
    fn test_parse_date_rfc2822_and_rfc3339() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(parse_date("Tue, 02 Jan 2024 15:04:05 +0000"), Some(expected));
        assert_eq!(parse_date("Tue, 02 Jan 2024 10:04:05 EST"), Some(expected));
        assert_eq!(parse_date("2024-01-02T15:04:05Z"), Some(expected));
    }

    #[test]
    fn test_parse_date_wrong_weekday_and_naive_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 15, 4, 5).unwrap();
        // 2024-01-02 was a Tuesday
        assert_eq!(parse_date("Fri, 02 Jan 2024 15:04:05 GMT"), Some(expected));
        assert_eq!(parse_date("2024-01-02 15:04:05"), Some(expected));
        assert_eq!(
            parse_date("2024-01-02"),
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_date_garbage() {
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("32/13/2024"), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --Rust & You--  "), "rust-you");
        assert_eq!(slugify("Épisode Été"), "épisode-été");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_fallback_guid_with_date() {
        let date = Utc.with_ymd_and_hms(2023, 11, 5, 8, 0, 0).unwrap();
        assert_eq!(
            fallback_guid("The Big Show #12", Some(date)),
            "the-big-show-12-2023-11-05"
        );
        assert_eq!(fallback_guid("", None), "unknown");
    }

    #[test]
    fn test_parse_explicit() {
        assert!(parse_explicit("yes"));
        assert!(parse_explicit(" True "));
        assert!(parse_explicit("explicit"));
        assert!(!parse_explicit("no"));
        assert!(!parse_explicit("clean"));
        assert!(!parse_explicit(""));
    }

    #[test]
    fn test_parse_positive_number() {
        assert_eq!(parse_positive_number(" 3 "), Some(3));
        assert_eq!(parse_positive_number("0"), None);
        assert_eq!(parse_positive_number("two"), None);
    }

    #[test]
    fn test_split_keywords() {
        assert_eq!(
            split_keywords(" rust, systems ,,programming, rust "),
            vec!["rust", "systems", "programming"]
        );
        assert!(split_keywords(" , ").is_empty());
    }

    #[test]
    fn test_normalize_category() {
        assert_eq!(
            normalize_category("iTunes Technology").as_deref(),
            Some("Technology")
        );
        assert_eq!(
            normalize_category("Society &amp; Culture").as_deref(),
            Some("Society & Culture")
        );
        assert_eq!(normalize_category("News").as_deref(), Some("News"));
        assert_eq!(normalize_category("  "), None);
    }
}
