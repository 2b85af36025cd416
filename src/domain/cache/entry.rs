//! Cache entry and statistics types

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A cached operation result
#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub operation: String,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    /// `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    /// Logical clock of the last access; lowest is least recently used
    #[serde(skip)]
    pub access_tick: u64,
    pub size_bytes: usize,
    pub watched_sources: Vec<String>,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn watches_any(&self, sources: &[String]) -> bool {
        self.watched_sources.iter().any(|s| sources.contains(s))
    }
}

/// Approximate in-memory size of a value, measured as its JSON encoding
pub fn approximate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Options for a single cache store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheSetOptions {
    /// Time to live in milliseconds; `None` or `Some(0)` means no expiry
    pub ttl_ms: Option<u64>,
    /// External change sources that invalidate the entry
    pub watch_sources: Vec<String>,
}

impl CacheSetOptions {
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = Some(ttl_ms);
        self
    }

    pub fn with_watch_sources(mut self, sources: Vec<String>) -> Self {
        self.watch_sources = sources;
        self
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
}
