//! Lightweight LRU cache implementation
//!
//! Bounded map with least-recently-used eviction. Access order is tracked in
//! a queue of (stamp, key) pairs: every access pushes a fresh stamp, and
//! eviction pops from the front, skipping stamps that no longer match the
//! entry's latest access. Candidate selection is amortized O(1) instead of a
//! full scan.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
struct LruEntry<V> {
    value: V,
    last_access: u64,
    size_bytes: usize,
}

/// A bounded LRU (least recently used) cache
#[derive(Debug)]
pub struct LruCache<K, V> {
    /// Storage for cached items
    entries: HashMap<K, LruEntry<V>>,
    /// Access-order queue; front is the oldest candidate
    order: VecDeque<(u64, K)>,
    /// Maximum number of entries
    capacity: usize,
    /// Monotonic access counter for LRU stamps
    access_counter: u64,
    /// Approximate total memory of stored values
    current_bytes: usize,
    /// Total entries evicted by capacity pressure
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    /// Create a new LRU cache with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            access_counter: 0,
            current_bytes: 0,
            evictions: 0,
        }
    }

    /// Get a reference to a cached value
    ///
    /// Updates the access order.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.access_counter += 1;
        let stamp = self.access_counter;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = stamp;
            self.order.push_back((stamp, key.clone()));
            self.maybe_compact();
            self.entries.get(key).map(|e| &e.value)
        } else {
            None
        }
    }

    /// Get a mutable reference to a cached value
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.access_counter += 1;
        let stamp = self.access_counter;
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = stamp;
            self.order.push_back((stamp, key.clone()));
        }
        self.maybe_compact();
        self.entries.get_mut(key).map(|e| &mut e.value)
    }

    /// Check if a key exists without touching the access order
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Peek at a value without touching the access order
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Insert a value into the cache
    ///
    /// If the cache is at capacity, least-recently-used entries are evicted.
    /// Returns the previous value for the key, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert_with_size(key, value, 0)
    }

    /// Insert a value with a known size for memory accounting
    pub fn insert_with_size(&mut self, key: K, value: V, size_bytes: usize) -> Option<V> {
        self.access_counter += 1;
        let stamp = self.access_counter;

        if let Some(entry) = self.entries.get_mut(&key) {
            let old_size = entry.size_bytes;
            let old_value = std::mem::replace(&mut entry.value, value);
            entry.last_access = stamp;
            entry.size_bytes = size_bytes;
            self.current_bytes = self.current_bytes.saturating_sub(old_size) + size_bytes;
            self.order.push_back((stamp, key));
            self.maybe_compact();
            return Some(old_value);
        }

        while self.entries.len() >= self.capacity {
            if !self.evict_lru() {
                break;
            }
        }

        self.current_bytes += size_bytes;
        self.entries.insert(
            key.clone(),
            LruEntry {
                value,
                last_access: stamp,
                size_bytes,
            },
        );
        self.order.push_back((stamp, key));
        self.maybe_compact();
        None
    }

    /// Remove a specific key from the cache
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|e| {
            self.current_bytes = self.current_bytes.saturating_sub(e.size_bytes);
            e.value
        })
    }

    /// Remove all entries not matching a predicate
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut removed_bytes = 0usize;
        self.entries.retain(|k, e| {
            let keep = f(k, &e.value);
            if !keep {
                removed_bytes += e.size_bytes;
            }
            keep
        });
        self.current_bytes = self.current_bytes.saturating_sub(removed_bytes);
    }

    /// Iterate over entries without touching the access order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.current_bytes = 0;
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get approximate total memory of stored values in bytes
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Get the total number of capacity evictions
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Get cache statistics
    pub fn stats(&self) -> LruStats {
        LruStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            total_bytes: self.current_bytes,
            evictions: self.evictions,
        }
    }

    /// Evict the least recently used entry; returns false if nothing evicted
    fn evict_lru(&mut self) -> bool {
        while let Some((stamp, key)) = self.order.pop_front() {
            let is_current = self
                .entries
                .get(&key)
                .map(|e| e.last_access == stamp)
                .unwrap_or(false);
            if is_current {
                if let Some(entry) = self.entries.remove(&key) {
                    self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
                    self.evictions += 1;
                    tracing::trace!(total_evictions = self.evictions, "evicted LRU entry");
                    return true;
                }
            }
            // Stale stamp (entry re-accessed since, or already removed) - skip
        }
        false
    }

    /// Drop stale stamps once the queue outgrows the live entry set
    fn maybe_compact(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + 16 {
            return;
        }
        let entries = &self.entries;
        self.order.retain(|(stamp, key)| {
            entries
                .get(key)
                .map(|e| e.last_access == *stamp)
                .unwrap_or(false)
        });
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy)]
pub struct LruStats {
    pub entries: usize,
    pub capacity: usize,
    pub total_bytes: usize,
    pub evictions: u64,
}
