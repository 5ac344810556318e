//! Parser configuration, optionally loaded from a TOML file.
//!
//! The library never reads configuration on its own: callers construct a
//! [`ParserConfig`] (usually `ParserConfig::default()`) or load one from a path
//! they choose. A missing file yields the defaults. Unknown keys are accepted
//! and logged as warnings, since they are most likely typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for fetching, caching and chapter resolution.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,

    /// Per-attempt timeout for the feed request, in seconds.
    pub request_timeout_secs: u64,

    /// Total attempts for transport-level failures (HTTP errors are never retried).
    pub retry_attempts: u32,

    /// Backoff base in milliseconds: waits are `base * 2^(attempt - 1)`.
    pub retry_base_delay_ms: u64,

    /// Maximum feed body size in bytes.
    pub max_feed_bytes: usize,

    /// How long a parsed feed is served from cache without revalidation, in seconds.
    pub cache_max_age_secs: u64,

    /// Timeout for a single chapters JSON request, in seconds.
    pub chapters_timeout_secs: u64,

    /// Maximum chapters JSON body size in bytes.
    pub chapters_max_bytes: usize,

    /// How many chapters documents are fetched at once.
    pub chapter_fetch_concurrency: usize,

    /// Permit feed and chapter URLs on localhost and private networks.
    pub allow_private_hosts: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("podfeed/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            max_feed_bytes: 10 * 1024 * 1024, // 10MB
            cache_max_age_secs: 60 * 60,
            chapters_timeout_secs: 10,
            chapters_max_bytes: 1024 * 1024, // 1MB
            chapter_fetch_concurrency: 4,
            allow_private_hosts: false,
        }
    }
}

impl ParserConfig {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "user_agent",
        "request_timeout_secs",
        "retry_attempts",
        "retry_base_delay_ms",
        "max_feed_bytes",
        "cache_max_age_secs",
        "chapters_timeout_secs",
        "chapters_max_bytes",
        "chapter_fetch_concurrency",
        "allow_private_hosts",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(ParserConfig::default())`
    /// - Empty file → `Ok(ParserConfig::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading to prevent memory exhaustion
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded parser configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text. Blank text yields the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn cache_max_age(&self) -> Duration {
        Duration::from_secs(self.cache_max_age_secs)
    }

    pub fn chapters_timeout(&self) -> Duration {
        Duration::from_secs(self.chapters_timeout_secs)
    }
}

// ============================================================================
// Tests
// ============================================================================
