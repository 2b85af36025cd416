//! In-memory result cache with TTL, strict LRU eviction and change-source invalidation
//!
//! Entries live in a sharded map, so lookups, inserts and invalidations of unrelated keys
//! only touch their own shard. Capacity is reserved on atomic counters before an entry is
//! inserted; when a reservation does not fit, the least recently used entry is evicted
//! and the reservation retried. Eviction never runs while a shard lock is held.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::cache::{
    approximate_size, CacheEntry, CacheKeyGenerator, CacheKeyParams, CacheSetOptions,
    CacheSettings, CacheStats, DefaultKeyGenerator,
};
use crate::infrastructure::observability::record_cache_event;

/// Capacity and maintenance settings
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    pub max_entries: usize,
    pub max_size_bytes: usize,
    /// Interval of the background expiry sweep; 0 disables the sweeper
    pub sweep_interval_ms: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for ResultCacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            max_entries: settings.max_entries,
            max_size_bytes: settings.max_size_bytes,
            sweep_interval_ms: settings.sweep_interval_ms,
        }
    }
}

impl ResultCacheConfig {
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_size_bytes(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_sweep_interval_ms(mut self, sweep_interval_ms: u64) -> Self {
        self.sweep_interval_ms = sweep_interval_ms;
        self
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    invalidations: AtomicU64,
}

/// Operation result cache
#[derive(Debug)]
pub struct ResultCache {
    config: ResultCacheConfig,
    key_generator: DefaultKeyGenerator,
    entries: DashMap<String, CacheEntry>,
    entry_count: AtomicUsize,
    total_bytes: AtomicUsize,
    clock: AtomicU64,
    counters: Counters,
    sweeper: Mutex<Option<CancellationToken>>,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(ResultCacheConfig::default())
    }
}

impl ResultCache {
    pub fn new(config: ResultCacheConfig) -> Self {
        Self {
            config,
            key_generator: DefaultKeyGenerator::new(),
            entries: DashMap::new(),
            entry_count: AtomicUsize::new(0),
            total_bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            counters: Counters::default(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ResultCacheConfig {
        &self.config
    }

    /// Deterministic key of an operation call
    pub fn key_for(&self, operation: &str, parameters: &Value) -> String {
        self.key_generator
            .generate(&CacheKeyParams::from_parameters(operation, parameters))
    }

    /// Look up a cached result. Expired entries are removed and reported as misses.
    pub fn get(&self, operation: &str, parameters: &Value) -> Option<Value> {
        let key = self.key_for(operation, parameters);
        let now = Utc::now();

        {
            let Some(mut entry) = self.entries.get_mut(&key) else {
                self.count_miss();
                return None;
            };

            if !entry.is_expired_at(now) {
                entry.access_count += 1;
                entry.last_accessed = now;
                entry.access_tick = self.tick();

                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                record_cache_event("hit", 1);
                return Some(entry.value.clone());
            }
        }

        if self.remove_entry(&key).is_some() {
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
            record_cache_event("expiration", 1);
        }

        self.count_miss();
        None
    }

    /// Store a result. Returns false when the value can never fit the byte bound.
    pub fn set(
        &self,
        operation: &str,
        parameters: &Value,
        value: Value,
        options: CacheSetOptions,
    ) -> bool {
        let size = approximate_size(&value);

        if self.config.max_entries == 0 || size > self.config.max_size_bytes {
            debug!(operation, size, "Result too large to cache");
            return false;
        }

        let key = self.key_for(operation, parameters);
        let now = Utc::now();
        let expires_at = options
            .ttl_ms
            .filter(|ttl| *ttl > 0)
            .map(|ttl| now + chrono::Duration::milliseconds(ttl as i64));

        let entry = CacheEntry {
            key: key.clone(),
            operation: operation.to_string(),
            value,
            created_at: now,
            expires_at,
            access_count: 0,
            last_accessed: now,
            access_tick: self.tick(),
            size_bytes: size,
            watched_sources: options.watch_sources,
        };

        self.remove_entry(&key);

        while !self.try_reserve(size) {
            if !self.evict_lru() {
                // every remaining slot is reserved by inserts still in flight
                debug!(operation, size, "No room to cache result");
                return false;
            }
        }

        if let Some(replaced) = self.entries.insert(key, entry) {
            self.release(replaced.size_bytes);
        }

        true
    }

    /// Remove the entry for one call
    pub fn invalidate(&self, operation: &str, parameters: &Value) -> bool {
        let key = self.key_for(operation, parameters);
        self.invalidate_key(&key)
    }

    pub fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.remove_entry(key).is_some();

        if removed {
            self.count_invalidations(1);
        }

        removed
    }

    /// Remove every entry of an operation
    pub fn invalidate_operation(&self, operation: &str) -> usize {
        self.remove_where(|entry| entry.operation == operation)
    }

    /// Remove every entry whose watch list intersects `sources`, regardless of TTL
    pub fn invalidate_sources(&self, sources: &[String]) -> usize {
        if sources.is_empty() {
            return 0;
        }

        let removed = self.remove_where(|entry| entry.watches_any(sources));
        debug!(?sources, removed, "Invalidated cache entries by change source");
        removed
    }

    pub fn clear(&self) -> usize {
        self.remove_where(|_| true)
    }

    /// Remove already-expired entries
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let keys = self.keys_where(|entry| entry.is_expired_at(now));

        let removed = keys
            .iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count();

        self.counters
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        record_cache_event("expiration", removed as u64);
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheStats {
            entries: self.entries.len(),
            size_bytes: self.total_bytes.load(Ordering::Acquire),
            hits,
            misses,
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Spawn the background expiry sweep. Replaces a sweeper that is already running.
    pub fn start_sweeper(self: &Arc<Self>) {
        if self.config.sweep_interval_ms == 0 {
            return;
        }

        let token = CancellationToken::new();
        if let Some(previous) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone())
        {
            previous.cancel();
        }

        let interval = Duration::from_millis(self.config.sweep_interval_ms);
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {
                        let Some(cache) = cache.upgrade() else {
                            break;
                        };

                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            debug!(removed, "Swept expired cache entries");
                        }
                    }
                }
            }
        });
    }

    pub fn stop_sweeper(&self) {
        if let Some(token) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn count_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        record_cache_event("miss", 1);
    }

    fn count_invalidations(&self, count: usize) {
        self.counters
            .invalidations
            .fetch_add(count as u64, Ordering::Relaxed);
        record_cache_event("invalidation", count as u64);
    }

    /// Claim one entry slot and `size` bytes, or nothing
    fn try_reserve(&self, size: usize) -> bool {
        let max_entries = self.config.max_entries;
        let max_bytes = self.config.max_size_bytes;

        let slot = self
            .entry_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count < max_entries).then_some(count + 1)
            });
        if slot.is_err() {
            return false;
        }

        let bytes = self
            .total_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |total| {
                (total + size <= max_bytes).then_some(total + size)
            });
        if bytes.is_err() {
            self.entry_count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        true
    }

    fn release(&self, size: usize) {
        self.entry_count.fetch_sub(1, Ordering::AcqRel);
        self.total_bytes.fetch_sub(size, Ordering::AcqRel);
    }

    /// Evict the least recently accessed entry. False when the map is empty.
    fn evict_lru(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.access_tick)
            .map(|entry| entry.key().clone());

        let Some(victim) = victim else {
            return false;
        };

        if self.remove_entry(&victim).is_some() {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            record_cache_event("eviction", 1);
            debug!(key = %victim, "Evicted least recently used cache entry");
        }

        true
    }

    fn keys_where(&self, predicate: impl Fn(&CacheEntry) -> bool) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn remove_where(&self, predicate: impl Fn(&CacheEntry) -> bool) -> usize {
        let keys = self.keys_where(predicate);
        let removed = keys
            .iter()
            .filter(|key| self.remove_entry(key).is_some())
            .count();

        self.count_invalidations(removed);
        removed
    }

    fn remove_entry(&self, key: &str) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| {
            self.release(entry.size_bytes);
            entry
        })
    }
}

impl Drop for ResultCache {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}
