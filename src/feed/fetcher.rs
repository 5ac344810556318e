use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{
    HeaderMap, ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT,
};
use reqwest::redirect::Policy;
use reqwest::StatusCode;
use thiserror::Error;

use super::types::{ConditionalHeaders, FeedResponse};
use crate::config::ParserConfig;
use crate::error::FeedError;
use crate::util::validate_url;

/// `Accept` header sent with feed requests.
pub const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml, */*";

/// Maximum redirect hops followed for any request.
const MAX_REDIRECTS: usize = 3;

/// Failure of a single request attempt.
///
/// Only transport-level variants are retried; see [`FetchError::is_transient`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, interrupted body, etc.)
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response with a status of 400 or above
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The attempt (request and body) exceeded its timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {limit} bytes)")]
    ResponseTooLarge { limit: usize },
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// Whether another attempt could succeed. HTTP statuses, oversized bodies
    /// and request-building or redirect-policy failures are final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => !(e.is_builder() || e.is_redirect() || e.is_status()),
            FetchError::Timeout(_) | FetchError::IncompleteResponse { .. } => true,
            FetchError::HttpStatus(_) | FetchError::ResponseTooLarge { .. } => false,
        }
    }
}

// ============================================================================
// HTTP Client Configuration
// ============================================================================

/// Redirect policy with a hop limit, loop detection and, unless private hosts
/// are allowed, the same SSRF screening applied to the initial URL.
fn create_redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("Too many redirects (max {MAX_REDIRECTS})"));
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        // SEC-015: a public feed must not bounce the fetch onto an internal host
        if let Err(e) = validate_url(url.as_str(), allow_private_hosts) {
            return attempt.error(format!("Redirect target rejected: {e}"));
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Builds the HTTP client shared by feed and chapter requests.
///
/// Timeouts are applied per request by the callers, so none is set here.
pub fn build_client(config: &ParserConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(create_redirect_policy(config.allow_private_hosts))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .build()
}

// ============================================================================
// Fetcher
// ============================================================================

/// Conditional GET with bounded retry for transport failures.
///
/// The fetcher never touches the cache; callers pass in the validators they
/// want offered upstream.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    user_agent: String,
    timeout: Duration,
    retry_attempts: u32,
    retry_base_delay: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, config: &ParserConfig) -> Self {
        Self {
            client,
            user_agent: config.user_agent.clone(),
            timeout: config.request_timeout(),
            retry_attempts: config.retry_attempts.max(1),
            retry_base_delay: config.retry_base_delay(),
            max_bytes: config.max_feed_bytes,
        }
    }

    /// Fetches `url`, attaching the caller's conditional headers.
    ///
    /// Statuses below 400 (304 included) are returned as responses; a 304 has
    /// an empty body.
    ///
    /// # Errors
    ///
    /// [`FeedError::Network`]:
    /// - immediately, with the status, for any status of 400 or above
    /// - immediately for a body larger than `max_feed_bytes`
    /// - after `retry_attempts` attempts for transport failures (timeout,
    ///   DNS, connection reset, interrupted body), waiting
    ///   `base * 2^(attempt - 1)` before each retry
    pub async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalHeaders,
    ) -> Result<FeedResponse, FeedError> {
        let mut attempt: u32 = 1;

        loop {
            let attempt_result =
                tokio::time::timeout(self.timeout, self.attempt(url, conditional)).await;
            let result = match attempt_result {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(self.timeout)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    let delay = backoff_delay(self.retry_base_delay, attempt);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        max_attempts = self.retry_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(FetchError::HttpStatus(status)) => {
                    return Err(FeedError::network(url, Some(status), format!("HTTP {status}")));
                }
                Err(e) if e.is_transient() => {
                    return Err(FeedError::network(
                        url,
                        None,
                        format!("{e} (after {attempt} attempts)"),
                    ));
                }
                Err(e) => return Err(FeedError::network(url, None, e.to_string())),
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        conditional: &ConditionalHeaders,
    ) -> Result<FeedResponse, FetchError> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .header(ACCEPT, FEED_ACCEPT);
        if let Some(etag) = &conditional.if_none_match {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(last_modified) = &conditional.if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, last_modified.as_str());
        }

        let response = request.send().await?;
        let status = response.status();

        // EDGE-002: 4xx/5xx fail immediately, never retried
        if status.as_u16() >= 400 {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let headers = response.headers().clone();
        let etag = header_string(&headers, ETAG);
        let last_modified = header_string(&headers, LAST_MODIFIED);

        let data = if status == StatusCode::NOT_MODIFIED {
            tracing::debug!(url = %url, "Feed not modified");
            Vec::new()
        } else {
            read_limited_bytes(response, self.max_bytes).await?
        };

        Ok(FeedResponse {
            data,
            status: status.as_u16(),
            headers,
            etag,
            last_modified,
        })
    }
}

/// `base * 2^(attempt - 1)`, saturating.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Reads a response body, enforcing `limit` and checking it against
/// Content-Length.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge { limit });
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }

    // EDGE-005: a body shorter than Content-Length means the stream was cut
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
