//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//! - **HTML handling**: Blacklist sanitization and plain-text extraction for show notes
//! - **Field coercion**: Durations, dates, GUID slugs, keywords and categories
//! - **Text processing**: Control-character stripping and char-safe truncation
//!
//! # Examples
//!
//! ```
//! use podfeed::util::{parse_duration, sanitize_html, validate_url};
//!
//! let url = validate_url("https://example.com/feed.xml", false).unwrap();
//! assert_eq!(parse_duration("1:30"), Some(90));
//! assert_eq!(sanitize_html("<b onclick=\"x()\">hi</b>"), "<b>hi</b>");
//! ```

mod coerce;
mod html;
mod text;
mod url_validator;

pub use coerce::{
    fallback_guid, normalize_category, parse_date, parse_duration, parse_explicit,
    parse_positive_number, slugify, split_keywords,
};
pub use html::{html_to_text, sanitize_html};
pub use text::{collapse_whitespace, strip_control_chars, truncate_chars};
pub use url_validator::{http_url, is_http_url, validate_url, UrlValidationError};
