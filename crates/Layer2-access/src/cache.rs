//! Response cache
//!
//! TTL key/value cache with get-or-compute semantics over the foundation
//! LRU store. Expired entries are removed lazily on read; capacity pressure
//! evicts least-recently-used entries. A TTL of zero always bypasses the
//! cache - write/mutating operations must never be cached.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use relay_foundation::cache::LruCache;

use crate::error::ApiError;

/// Invalidation target: an exact key or a regex over keys
#[derive(Debug, Clone)]
pub enum CachePattern {
    Exact(String),
    Matching(Regex),
}

impl CachePattern {
    /// Exact-key pattern
    pub fn exact(key: impl Into<String>) -> Self {
        CachePattern::Exact(key.into())
    }

    /// Regex pattern; invalid expressions are a caller-input problem
    pub fn matching(pattern: &str) -> Result<Self, ApiError> {
        Regex::new(pattern)
            .map(CachePattern::Matching)
            .map_err(|e| ApiError::Validation(format!("invalid cache pattern: {}", e)))
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        match self {
            CachePattern::Exact(k) => k == key,
            CachePattern::Matching(re) => re.is_match(key),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    value: Arc<Value>,
    created_at: Instant,
    expires_at: Instant,
    hit_count: u64,
}

/// TTL response cache with LRU eviction
#[derive(Debug)]
pub struct ResponseCache {
    store: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache bounded to `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(LruCache::new(max_entries)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached value for `key`, or compute, store, and return it
    ///
    /// `compute` is invoked only on a miss: a hit must not build the
    /// computation at all (side effects like dedup registration stay
    /// miss-only). A zero TTL bypasses the cache entirely: the computation
    /// runs and its result is neither stored nor counted.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Value>, ApiError>>,
    {
        if ttl.is_zero() {
            return compute().await;
        }

        if let Some(value) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let value = compute().await?;
        self.insert(key, value.clone(), ttl);
        Ok(value)
    }

    /// Fresh-entry lookup; expired entries are removed on the spot
    fn lookup(&self, key: &str) -> Option<Arc<Value>> {
        let now = Instant::now();
        let mut store = self.store.lock();
        let owned = key.to_string();

        match store.get_mut(&owned) {
            Some(entry) if entry.expires_at > now => {
                entry.hit_count += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                store.remove(&owned);
                None
            }
            None => None,
        }
    }

    /// Store a value under `key` with the given TTL
    pub fn insert(&self, key: &str, value: Arc<Value>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let size = value.to_string().len();
        let entry = CacheEntry {
            value,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
        };
        debug_assert!(entry.expires_at > entry.created_at);
        self.store.lock().insert_with_size(key.to_string(), entry, size);
    }

    /// Remove all entries whose key matches the pattern; returns the count
    pub fn invalidate(&self, pattern: &CachePattern) -> usize {
        let mut store = self.store.lock();
        let before = store.len();
        store.retain(|key, _| !pattern.matches(key));
        before - store.len()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.store.lock().clear();
    }

    /// Snapshot of cache counters
    pub fn stats(&self) -> CacheStats {
        let store = self.store.lock();
        let lru = store.stats();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: lru.evictions,
            entries: lru.entries,
            approx_bytes: lru.total_bytes,
        }
    }
}

/// Response cache counters (monotonic except `entries`/`approx_bytes`)
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub approx_bytes: usize,
}

impl CacheStats {
    /// Hit rate over all lookups (0.0 when no lookups happened)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
