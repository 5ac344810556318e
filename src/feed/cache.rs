use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::types::{CacheStats, CachedFeed, ConditionalHeaders, ParsedFeed};

/// Default freshness window for cached feeds (1 hour)
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

impl CachedFeed {
    /// Validators to offer upstream, regardless of freshness.
    pub fn conditional_headers(&self) -> ConditionalHeaders {
        ConditionalHeaders {
            if_none_match: self.etag.clone(),
            if_modified_since: self.last_modified.clone(),
        }
    }
}

/// Outcome of [`FeedCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Entry within `max_age`; serve it without touching the network.
    Fresh(CachedFeed),
    /// Entry past `max_age`. It has been evicted, but its validators and feed
    /// are handed back so a 304 answer can still be served from it.
    Stale(CachedFeed),
    Miss,
}

/// In-memory feed cache keyed by feed URL.
///
/// Freshness is purely time based (`max_age`); there is no size bound because
/// the polling cadence is controlled by the caller. Entries are evicted lazily
/// when read past `max_age`, by [`sweep_expired`](Self::sweep_expired), or
/// explicitly.
///
/// # Concurrency
///
/// Every operation runs under one mutex, so read-check-evict is atomic with
/// respect to writes: a stale eviction can never remove an entry that another
/// task has just re-populated, and [`set`](Self::set) never replaces an entry
/// that is newer than the incoming one.
#[derive(Debug)]
pub struct FeedCache {
    entries: Mutex<HashMap<String, CachedFeed>>,
    max_age: TimeDelta,
}

impl Default for FeedCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl FeedCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_age: TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX),
        }
    }

    /// The configured freshness window.
    pub fn max_age(&self) -> Duration {
        self.max_age.to_std().unwrap_or(Duration::MAX)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedFeed>> {
        // The map stays consistent even if a holder panicked mid-operation:
        // every mutation is a single insert/remove.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &CachedFeed, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.updated_at) > self.max_age
    }

    /// Returns the fresh entry for `url`, evicting it if it has expired.
    pub fn get(&self, url: &str) -> Option<CachedFeed> {
        match self.lookup(url) {
            CacheLookup::Fresh(entry) => Some(entry),
            CacheLookup::Stale(_) | CacheLookup::Miss => None,
        }
    }

    /// Classifies the entry for `url`, evicting it when stale.
    pub fn lookup(&self, url: &str) -> CacheLookup {
        self.lookup_at(url, Utc::now())
    }

    pub(crate) fn lookup_at(&self, url: &str, now: DateTime<Utc>) -> CacheLookup {
        let mut entries = self.lock();
        let expired = match entries.get(url) {
            None => return CacheLookup::Miss,
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            tracing::debug!(url = %url, "Evicting stale cache entry");
            match entries.remove(url) {
                Some(entry) => CacheLookup::Stale(entry),
                None => CacheLookup::Miss,
            }
        } else {
            match entries.get(url) {
                Some(entry) => CacheLookup::Fresh(entry.clone()),
                None => CacheLookup::Miss,
            }
        }
    }

    /// Stores `feed` for `url` with the validators that produced it, stamped now.
    pub fn set(
        &self,
        url: &str,
        feed: ParsedFeed,
        etag: Option<String>,
        last_modified: Option<String>,
    ) {
        self.set_at(url, feed, etag, last_modified, Utc::now());
    }

    /// Stores an entry stamped `updated_at`, unless a newer entry is already present.
    pub(crate) fn set_at(
        &self,
        url: &str,
        feed: ParsedFeed,
        etag: Option<String>,
        last_modified: Option<String>,
        updated_at: DateTime<Utc>,
    ) {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(url) {
            if existing.updated_at > updated_at {
                tracing::debug!(url = %url, "Keeping newer cache entry over late write");
                return;
            }
        }
        entries.insert(
            url.to_owned(),
            CachedFeed {
                feed,
                etag,
                last_modified,
                updated_at,
            },
        );
    }

    /// Validators for `url`, offered even when the entry is past `max_age`.
    pub fn conditional_headers(&self, url: &str) -> ConditionalHeaders {
        self.lock()
            .get(url)
            .map(CachedFeed::conditional_headers)
            .unwrap_or_default()
    }

    /// Whether an entry (fresh or not yet evicted) exists for `url`.
    pub fn has(&self, url: &str) -> bool {
        self.lock().contains_key(url)
    }

    /// Removes the entry for `url`; returns whether one existed.
    pub fn delete(&self, url: &str) -> bool {
        self.lock().remove(url).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Entry count and cached URLs (sorted).
    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        let mut urls: Vec<String> = entries.keys().cloned().collect();
        urls.sort();
        CacheStats {
            size: entries.len(),
            urls,
        }
    }

    /// Removes every entry past `max_age`; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now.signed_duration_since(entry.updated_at) <= self.max_age);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }
}
