//! Concurrent-request deduplication
//!
//! Coalesces logically identical concurrent calls onto one in-flight
//! future. The check for an existing entry and the registration of a new
//! one happen under a single synchronous lock, so two callers can never
//! both issue the underlying fetch for the same key. Every waiter receives
//! a clone of the same outcome (success or error).
//!
//! There is no cancellation: dropping a waiter does not stop the underlying
//! call. The only time bound is `max_pending`, which governs bookkeeping
//! only - entries older than it are dropped from the table so later callers
//! stop coalescing onto a possibly-stuck call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;

use relay_foundation::config::DedupSettings;

use crate::error::ApiError;

/// Outcome shared across coalesced waiters
pub type SharedOutcome = Result<Arc<Value>, ApiError>;

/// A cloneable handle onto one in-flight call
pub type InFlight = Shared<BoxFuture<'static, SharedOutcome>>;

struct PendingRequest {
    future: InFlight,
    /// Generation guard: self-removal only deletes its own entry
    id: u64,
    subscribers: u64,
    started_at: Instant,
}

/// Coalesces concurrent identical calls into one in-flight operation
pub struct RequestDeduplicator {
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    max_pending: Duration,
    next_id: AtomicU64,
    total: AtomicU64,
    coalesced: AtomicU64,
    expired: AtomicU64,
}

impl RequestDeduplicator {
    pub fn new(settings: &DedupSettings) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            max_pending: Duration::from_millis(settings.max_pending_ms),
            next_id: AtomicU64::new(0),
            total: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Join the in-flight call for `key`, or register `make()`'s future as
    /// the new in-flight call
    ///
    /// Registration is atomic with the lookup; the returned handle resolves
    /// to the shared outcome. The entry removes itself once it settles.
    pub fn execute<F>(&self, key: &str, make: F) -> InFlight
    where
        F: FnOnce() -> BoxFuture<'static, SharedOutcome>,
    {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut pending = self.pending.lock();
        self.sweep_locked(&mut pending);

        if let Some(entry) = pending.get_mut(key) {
            entry.subscribers += 1;
            self.coalesced.fetch_add(1, Ordering::Relaxed);
            return entry.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let table = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let inner = make();

        let wrapped: BoxFuture<'static, SharedOutcome> = async move {
            let result = inner.await;
            // Remove unconditionally on settle, but only our own generation
            let mut table = table.lock();
            if table.get(&owned_key).map(|p| p.id) == Some(id) {
                table.remove(&owned_key);
            }
            result
        }
        .boxed();
        let shared = wrapped.shared();

        pending.insert(
            key.to_string(),
            PendingRequest {
                future: shared.clone(),
                id,
                subscribers: 1,
                started_at: Instant::now(),
            },
        );
        shared
    }

    /// Drop entries older than `max_pending`; returns how many were dropped
    pub fn sweep(&self) -> usize {
        let mut pending = self.pending.lock();
        self.sweep_locked(&mut pending)
    }

    fn sweep_locked(&self, pending: &mut HashMap<String, PendingRequest>) -> usize {
        let now = Instant::now();
        let before = pending.len();
        pending.retain(|_, p| now.duration_since(p.started_at) <= self.max_pending);
        let removed = before - pending.len();
        if removed > 0 {
            self.expired.fetch_add(removed as u64, Ordering::Relaxed);
            tracing::warn!(removed, "dropped stuck in-flight dedup entries");
        }
        removed
    }

    /// Number of currently tracked in-flight calls
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop all bookkeeping (does not cancel futures held by callers)
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    /// Snapshot of dedup counters
    pub fn stats(&self) -> DedupStats {
        DedupStats {
            total_calls: self.total.load(Ordering::Relaxed),
            coalesced_calls: self.coalesced.load(Ordering::Relaxed),
            expired_entries: self.expired.load(Ordering::Relaxed),
            in_flight: self.pending_count(),
        }
    }
}

/// Deduplication counters
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct DedupStats {
    pub total_calls: u64,
    pub coalesced_calls: u64,
    pub expired_entries: u64,
    pub in_flight: usize,
}
