//! Persistent cache entry types and the served snapshot shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AlertRecord;

/// One resolved location. Immutable once written: a location key is geocoded
/// at most once for the lifetime of the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeocodeCacheEntry {
    /// Normalized location key (primary identity)
    pub key: String,

    /// Resolved point as (longitude, latitude)
    pub coordinates: (f64, f64),

    /// Human-readable resolved name, when the provider supplies one
    pub place_name: Option<String>,

    /// When the provider call happened
    pub resolved_at: DateTime<Utc>,
}

/// One feed's latest enriched snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedCacheEntry {
    pub feed_key: String,
    pub records: Vec<AlertRecord>,
    pub cached_at: DateTime<Utc>,
}

impl FeedCacheEntry {
    pub fn new(feed_key: impl Into<String>, records: Vec<AlertRecord>) -> Self {
        Self {
            feed_key: feed_key.into(),
            records,
            cached_at: Utc::now(),
        }
    }
}

/// Coordination record: when the feed was last successfully fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchTrackerEntry {
    pub feed_key: String,
    pub last_fetch_at: DateTime<Utc>,
}

/// How the served snapshot was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fetched, parsed and enriched on this call
    FreshFetch,
    /// Served from cache inside the TTL window
    CacheHit,
    /// Refresh failed; serving the previous snapshot
    StaleFallback,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::FreshFetch => "fresh-fetch",
            CacheStatus::CacheHit => "cache-hit",
            CacheStatus::StaleFallback => "stale-fallback",
        }
    }
}

/// What callers of the feed service receive: records plus an observable
/// staleness indicator so the display layer can warn about data age.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub feed_key: String,
    pub records: Vec<AlertRecord>,
    pub status: CacheStatus,
    pub cached_at: DateTime<Utc>,
}
