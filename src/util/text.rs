use std::borrow::Cow;

fn is_stripped_control(c: char) -> bool {
    c == '\u{7f}' || (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r'))
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences from text.
///
/// Feed text is attacker-controlled and consumers may print it to a terminal,
/// so plain-text fields pass through here before they leave the normalizer.
///
/// Strips:
/// - ASCII control chars: 0x00-0x08, 0x0B-0x0C, 0x0E-0x1F, 0x7F
/// - ANSI CSI sequences: `\x1b[` ... (terminal byte 0x40-0x7E)
/// - ANSI OSC sequences: `\x1b]` ... (until BEL 0x07 or ST `\x1b\\`)
/// - Bare ESC (0x1b) not followed by `[` or `]`
///
/// Preserves: tab, newline, carriage return.
///
/// Returns `Cow::Borrowed` when the input contains no control characters (common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameter/intermediate bytes until the final byte
                    for c in chars.by_ref() {
                        if ('\u{40}'..='\u{7e}').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\u{07}' {
                            break;
                        }
                        if c == '\u{1b}' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if !is_stripped_control(c) {
            out.push(c);
        }
    }

    Cow::Owned(out)
}

/// Returns at most `max_chars` characters of `s`, cut on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_clean_text_returns_borrowed() {
        let input = "Episode 12: Rust in production";
        let result = strip_control_chars(input);
        assert!(matches!(result, Cow::Borrowed(_)));
        assert_eq!(result, input);
    }

    #[test]
    fn test_strip_preserves_tabs_newlines_cr() {
        let input = "line1\nline2\ttabbed\r\nwindows";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_removes_controls_and_del() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x08!"), "hello!");
        assert_eq!(strip_control_chars("delete\x7fme"), "deleteme");
    }

    #[test]
    fn test_strip_ansi_sequences() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m"), "Red");
        assert_eq!(
            strip_control_chars("\x1b]0;malicious title\x07safe"),
            "safe"
        );
        assert_eq!(
            strip_control_chars("\x1b]0;malicious title\x1b\\safe"),
            "safe"
        );
        assert_eq!(strip_control_chars("before\x1bafter"), "beforeafter");
    }

    #[test]
    fn test_strip_unicode_preserved() {
        assert_eq!(
            strip_control_chars("日本語 \x1b[31m赤い\x1b[0m"),
            "日本語 赤い"
        );
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("日本語テキスト", 2), "日本");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }
}
