use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
///
/// These errors cover both parsing failures and security policy violations
/// designed to prevent SSRF (Server-Side Request Forgery) attacks when a
/// feed (or a URL found inside one) points back into the local network.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// The URL points to a private/internal IP address.
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("Localhost not allowed")]
    Localhost,
}

/// Validates a URL string before the library fetches it.
///
/// Always rejects non-HTTP(S) schemes (e.g. `file://`, `ftp://`) and
/// host-less URLs. Unless `allow_private` is set, also rejects:
/// - Localhost addresses (`localhost`, `127.0.0.1`, `::1`)
/// - Private IP ranges (RFC 1918, link-local, unique local IPv6)
///
/// `allow_private` exists for local development and for tests that run
/// against a mock server bound to `127.0.0.1`.
///
/// # Examples
///
/// ```
/// use podfeed::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml", false).unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed", false).is_err());
/// assert!(validate_url("http://localhost/feed", true).is_ok());
/// assert!(validate_url("file:///etc/passwd", true).is_err());
/// ```
pub fn validate_url(url_str: &str, allow_private: bool) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    let host = url.host_str().ok_or(UrlValidationError::MissingHost)?;
    if allow_private {
        return Ok(url);
    }

    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlValidationError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlValidationError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlValidationError::PrivateIp(ip.to_string()));
        }
    }

    Ok(url)
}

/// Basic syntax check for URLs found inside feed content (images, funding links).
///
/// Accepts any absolute http(s) URL with a host. No network policy is applied:
/// these URLs are rendered or handed to consumers, not fetched by this crate.
pub fn is_http_url(candidate: &str) -> bool {
    match Url::parse(candidate.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// The trimmed candidate when it passes [`is_http_url`].
pub fn http_url(candidate: Option<&str>) -> Option<String> {
    candidate
        .map(str::trim)
        .filter(|url| is_http_url(url))
        .map(str::to_owned)
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/feed.xml", false).is_ok());
        assert!(validate_url("http://podcasts.example.org/rss", false).is_ok());
        assert!(validate_url("  https://example.com/padded  ", false).is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd", true),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(validate_url("ftp://example.com", false).is_err());
    }

    #[test]
    fn test_localhost_rejected_unless_allowed() {
        assert!(matches!(
            validate_url("http://localhost/feed", false),
            Err(UrlValidationError::Localhost)
        ));
        assert!(validate_url("http://127.0.0.1/feed", false).is_err());
        assert!(validate_url("http://127.0.0.1:8080/feed", true).is_ok());
    }

    #[test]
    fn test_private_ips_rejected() {
        assert!(validate_url("http://192.168.1.1/feed", false).is_err());
        assert!(validate_url("http://10.0.0.1:3000/feed", false).is_err());
        assert!(validate_url("http://172.16.0.1/feed", false).is_err());
        assert!(validate_url("http://169.254.1.1/feed", false).is_err());
        assert!(validate_url("http://0.0.0.0/feed", false).is_err());
    }

    #[test]
    fn test_ipv6_private_rejected() {
        assert!(validate_url("http://[::1]/feed", false).is_err());
        assert!(validate_url("http://[fe80::1]/feed", false).is_err());
        assert!(validate_url("http://[fd00::1]/feed", false).is_err());
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url("https://cdn.example.com/art.jpg"));
        assert!(is_http_url("http://192.168.1.1/local.png"));
        assert!(!is_http_url("/relative/art.jpg"));
        assert!(!is_http_url("javascript:alert(1)"));
        assert!(!is_http_url("data:image/png;base64,AAAA"));
        assert!(!is_http_url(""));
    }

    #[test]
    fn test_http_url_trims_and_filters() {
        assert_eq!(
            http_url(Some("  https://example.com/a.mp3 ")).as_deref(),
            Some("https://example.com/a.mp3")
        );
        assert_eq!(http_url(Some("ftp://example.com/a.mp3")), None);
        assert_eq!(http_url(None), None);
    }
}
