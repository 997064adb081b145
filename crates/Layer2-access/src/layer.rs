//! Access layer facade
//!
//! Composes the resilience components around a caller-supplied fetch:
//! deduplication innermost (around the fetch itself), caching around that,
//! performance measurement outermost. Measuring outside the cache means
//! reported latency is what the caller actually experienced: near-zero on a
//! hit, the coalescing wait on a shared miss.
//!
//! The layer never issues HTTP itself. Callers hand it a fetch future (or a
//! replayable fetch factory for the retry path) and the layer decides
//! whether that fetch actually runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use relay_foundation::config::AccessConfig;

use crate::cache::{CachePattern, CacheStats, ResponseCache};
use crate::dedup::{DedupStats, RequestDeduplicator, SharedOutcome};
use crate::error::ApiError;
use crate::graphql::{
    extract_operation_name, is_mutation, GraphQLCache, GraphQLCacheStats,
};
use crate::metrics::{OperationStats, PerformanceMonitor};
use crate::pagination::PaginationEngine;
use crate::params::{CallOptions, GraphQLOptions, Params};
use crate::retry::{ReliabilityManager, RetryPolicy};
use crate::telemetry::Telemetry;

/// Combined metrics snapshot across all components
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerMetrics {
    pub cache: CacheStats,
    pub graphql: GraphQLCacheStats,
    pub deduplication: DedupStats,
    pub performance: HashMap<String, OperationStats>,
}

/// Resilient access layer: caching, coalescing, retry, and measurement
/// composed around caller-supplied fetches
pub struct AccessLayer {
    config: AccessConfig,
    cache: ResponseCache,
    graphql: GraphQLCache,
    dedup: RequestDeduplicator,
    retry: Arc<ReliabilityManager>,
    monitor: PerformanceMonitor,
    pagination: PaginationEngine,
}

impl AccessLayer {
    pub fn new(config: AccessConfig) -> Self {
        let retry = ReliabilityManager::new(RetryPolicy::from_settings(&config.retry));
        Self {
            cache: ResponseCache::new(config.cache.max_entries),
            graphql: GraphQLCache::new(config.graphql.max_entries),
            dedup: RequestDeduplicator::new(&config.dedup),
            retry: Arc::new(retry),
            monitor: PerformanceMonitor::new(&config.metrics),
            pagination: PaginationEngine::new(config.pagination.clone()),
            config,
        }
    }

    /// Replace the retry telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        let policy = self.retry.policy().clone();
        self.retry = Arc::new(ReliabilityManager::new(policy).with_telemetry(telemetry));
        self
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Run one call through the full composition
    ///
    /// `fetch` is invoked at most once, and only when neither the cache nor
    /// an in-flight identical call can satisfy the request. Concurrent calls
    /// with the same `(operation, params)` signature share one fetch.
    pub async fn call<F>(
        &self,
        operation: &str,
        params: &Params,
        fetch: F,
        opts: CallOptions,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> BoxFuture<'static, SharedOutcome>,
    {
        let key = format!("{}::{}", operation, params.signature());
        let ttl = self.resolve_ttl(operation, &opts);

        // Dedup engages only inside the miss path: a cache hit must never
        // register a pending entry.
        let compute = || -> BoxFuture<'static, SharedOutcome> {
            if opts.skip_deduplication {
                fetch()
            } else {
                self.dedup.execute(&key, fetch).boxed()
            }
        };

        self.monitor
            .measure(operation, self.cache.get_or_compute(&key, ttl, compute))
            .await
    }

    /// Like [`call`](Self::call), with the fetch wrapped in the retry policy
    ///
    /// The retry loop runs inside the deduplicated future, so coalesced
    /// waiters share one retried call rather than each retrying on their
    /// own. `fetch` must therefore be replayable.
    pub async fn call_with_retry<F>(
        &self,
        operation: &str,
        params: &Params,
        fetch: F,
        opts: CallOptions,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnMut() -> BoxFuture<'static, SharedOutcome> + Send + 'static,
    {
        let retry = Arc::clone(&self.retry);
        let retried_op = operation.to_string();
        let make = move || {
            async move { retry.execute(&retried_op, fetch).await }.boxed()
        };
        self.call(operation, params, make, opts).await
    }

    /// Run a GraphQL document through the layer
    ///
    /// Queries go through dedup + the GraphQL cache (stale-on-error).
    /// Mutations bypass both: side effects must never coalesce or be
    /// cached. A successful mutation invalidates plausibly affected cached
    /// queries.
    pub async fn graphql<F>(
        &self,
        query: &str,
        variables: &Value,
        fetch: F,
        opts: GraphQLOptions,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> BoxFuture<'static, SharedOutcome>,
    {
        let operation =
            extract_operation_name(query).unwrap_or_else(|| "graphql".to_string());

        if opts.is_mutation.unwrap_or_else(|| is_mutation(query)) {
            let result = self.monitor.measure(&operation, fetch()).await;
            if result.is_ok() {
                self.graphql.invalidate_for_mutation(query, variables);
            }
            return result;
        }

        let ttl = if opts.skip_cache {
            Duration::ZERO
        } else {
            opts.ttl
                .unwrap_or_else(|| Duration::from_millis(self.config.graphql.default_ttl_ms))
        };
        let key = GraphQLCache::cache_key(query, variables);
        // As in call(): no pending entry on a fresh hit
        let compute = || -> BoxFuture<'static, SharedOutcome> {
            if opts.skip_deduplication {
                fetch()
            } else {
                self.dedup.execute(&key, fetch).boxed()
            }
        };

        self.monitor
            .measure(
                &operation,
                self.graphql.get_or_fetch(query, variables, ttl, compute),
            )
            .await
    }

    /// TTL resolution: skip flag, explicit option, per-operation config,
    /// library default
    fn resolve_ttl(&self, operation: &str, opts: &CallOptions) -> Duration {
        if opts.skip_cache {
            return Duration::ZERO;
        }
        match opts.cache_ttl {
            Some(ttl) => ttl,
            None => Duration::from_millis(self.config.cache.ttl_for_operation(operation)),
        }
    }

    /// The pagination engine, seeded with configured defaults
    pub fn pagination(&self) -> &PaginationEngine {
        &self.pagination
    }

    /// Remove matching response-cache entries; returns the count
    pub fn invalidate_cache(&self, pattern: &CachePattern) -> usize {
        self.cache.invalidate(pattern)
    }

    /// Remove matching GraphQL-cache entries; returns the count
    pub fn invalidate_graphql_cache(&self, pattern: &CachePattern) -> usize {
        self.graphql.invalidate(pattern)
    }

    /// Invalidate GraphQL entries plausibly affected by a mutation
    pub fn invalidate_for_mutation(&self, mutation: &str, variables: &Value) -> usize {
        self.graphql.invalidate_for_mutation(mutation, variables)
    }

    /// Snapshot of all component metrics
    pub fn get_metrics(&self) -> LayerMetrics {
        LayerMetrics {
            cache: self.cache.stats(),
            graphql: self.graphql.stats(),
            deduplication: self.dedup.stats(),
            performance: self.monitor.aggregated(),
        }
    }

    /// Detailed GraphQL cache stats (hot queries, efficiency, memory)
    pub fn get_graphql_cache_stats(&self) -> GraphQLCacheStats {
        self.graphql.stats()
    }

    /// Human-readable performance summary
    pub fn performance_report(&self) -> String {
        self.monitor.report()
    }

    /// Drop all response-cache entries
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop both caches and all performance samples
    pub fn clear_all(&self) {
        self.cache.clear();
        self.graphql.clear();
        self.monitor.clear();
    }

    /// Teardown: clear everything and drain the pending table
    ///
    /// In-flight futures held by callers still settle; there are no
    /// background timers to stop.
    pub fn destroy(&self) {
        self.clear_all();
        self.dedup.clear();
    }
}

impl Default for AccessLayer {
    fn default() -> Self {
        Self::new(AccessConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_resolution_order() {
        let mut config = AccessConfig::default();
        config.cache.default_ttl_ms = 30_000;
        config
            .cache
            .operation_ttl_ms
            .insert("get_repository".to_string(), 300_000);
        let layer = AccessLayer::new(config);

        // Explicit option wins
        let opts = CallOptions::default().with_ttl(Duration::from_millis(5));
        assert_eq!(
            layer.resolve_ttl("get_repository", &opts),
            Duration::from_millis(5)
        );
        // Per-operation config next
        assert_eq!(
            layer.resolve_ttl("get_repository", &CallOptions::default()),
            Duration::from_millis(300_000)
        );
        // Library default last
        assert_eq!(
            layer.resolve_ttl("unknown_op", &CallOptions::default()),
            Duration::from_millis(30_000)
        );
        // skip_cache forces zero
        let opts = CallOptions {
            skip_cache: true,
            cache_ttl: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        assert_eq!(layer.resolve_ttl("get_repository", &opts), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_mutation_bypasses_cache_and_invalidates() {
        let layer = AccessLayer::default();
        let vars = json!({"owner": "a", "name": "b"});

        // Seed a cached query touching the same entity
        layer
            .graphql(
                "query GetRepository { repository(owner: $owner) { id } }",
                &vars,
                || async { Ok(Arc::new(json!({"id": 1}))) }.boxed(),
                GraphQLOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(layer.get_graphql_cache_stats().general.entries, 1);

        layer
            .graphql(
                "mutation { updateRepository(input: $input) { repository { id } } }",
                &json!({"owner": "a"}),
                || async { Ok(Arc::new(json!({"ok": true}))) }.boxed(),
                GraphQLOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(layer.get_graphql_cache_stats().general.entries, 0);
    }
}
