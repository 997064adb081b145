//! GraphQL response cache
//!
//! Keyed by normalized query text plus canonical-JSON variables. Two
//! behaviors set it apart from the plain response cache:
//!
//! - **Stale-on-error**: expired entries are kept until evicted or
//!   invalidated; when a fetch fails and a stale value is still around, the
//!   stale value is served instead of the error (single level - a second
//!   consecutive failure with no cached value propagates).
//! - **Mutation-driven invalidation**: after a mutation, cached queries that
//!   appear to touch the same entity are dropped. This is an explicit
//!   best-effort approximation over operation names and shared identifying
//!   variables, not a dependency graph; it can both under- and
//!   over-invalidate. The extraction functions are swappable so a
//!   schema-aware implementation can replace them without touching callers.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

use relay_foundation::cache::{canonical_json, LruCache};

use crate::cache::CachePattern;
use crate::error::ApiError;

/// Variable names treated as entity identifiers during invalidation
const IDENTIFYING_VARIABLES: &[&str] = &[
    "owner",
    "repo",
    "name",
    "id",
    "number",
    "login",
    "issue_number",
    "pull_number",
];

/// Verb prefixes stripped from mutation root fields to find the entity
const MUTATION_VERBS: &[&str] = &[
    "create", "add", "update", "edit", "delete", "remove", "merge", "close", "reopen", "set",
    "transfer",
];

#[derive(Debug)]
struct GraphQLEntry {
    value: Arc<Value>,
    operation: String,
    variables: Value,
    expires_at: Instant,
    hit_count: u64,
}

/// Cache for GraphQL query results
pub struct GraphQLCache {
    store: Mutex<LruCache<String, GraphQLEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_served: AtomicU64,
    /// Best-effort query text -> operation name (swappable)
    extract_operation: fn(&str) -> Option<String>,
    /// Best-effort mutation -> candidate invalidation tokens (swappable)
    mutation_targets: fn(&str, &Value) -> Vec<String>,
}

impl GraphQLCache {
    /// Create a cache bounded to `max_entries` with the default heuristics
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Mutex::new(LruCache::new(max_entries)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_served: AtomicU64::new(0),
            extract_operation: extract_operation_name,
            mutation_targets: extract_mutation_targets,
        }
    }

    /// Swap the operation-name extraction function
    pub fn with_operation_extractor(mut self, f: fn(&str) -> Option<String>) -> Self {
        self.extract_operation = f;
        self
    }

    /// Swap the mutation-target extraction function
    pub fn with_mutation_targets(mut self, f: fn(&str, &Value) -> Vec<String>) -> Self {
        self.mutation_targets = f;
        self
    }

    /// Build the cache key for a query + variables pair
    pub fn cache_key(query: &str, variables: &Value) -> String {
        format!("{}::{}", normalize_query(query), canonical_json(variables))
    }

    /// Return the cached result, or fetch, store, and return it
    ///
    /// `fetch` is invoked only on a miss; a fresh hit never builds the
    /// fetch. On a fetch error with a stale (expired but not yet evicted)
    /// entry present, the stale value is returned instead of the error.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        query: &str,
        variables: &Value,
        ttl: Duration,
        fetch: F,
    ) -> Result<Arc<Value>, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Value>, ApiError>>,
    {
        if ttl.is_zero() {
            return fetch().await;
        }

        let key = Self::cache_key(query, variables);
        if let Some(value) = self.lookup_fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        match fetch().await {
            Ok(value) => {
                self.insert(query, variables, value.clone(), ttl);
                Ok(value)
            }
            Err(err) => {
                // Single-level graceful degradation
                if let Some(stale) = self.lookup_any(&key) {
                    self.stale_served.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        key = key.as_str(),
                        "serving stale GraphQL result after fetch error: {}",
                        err
                    );
                    return Ok(stale);
                }
                Err(err)
            }
        }
    }

    /// Fresh lookup; expired entries are left in place for stale-on-error
    fn lookup_fresh(&self, key: &str) -> Option<Arc<Value>> {
        let now = Instant::now();
        let mut store = self.store.lock();
        match store.get_mut(&key.to_string()) {
            Some(entry) if entry.expires_at > now => {
                entry.hit_count += 1;
                Some(entry.value.clone())
            }
            _ => None,
        }
    }

    /// Lookup ignoring expiry (stale fallback)
    fn lookup_any(&self, key: &str) -> Option<Arc<Value>> {
        self.store
            .lock()
            .peek(&key.to_string())
            .map(|e| e.value.clone())
    }

    /// Store a query result
    pub fn insert(&self, query: &str, variables: &Value, value: Arc<Value>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let key = Self::cache_key(query, variables);
        let operation = (self.extract_operation)(query).unwrap_or_else(|| "anonymous".to_string());
        let size = value.to_string().len();
        let entry = GraphQLEntry {
            value,
            operation,
            variables: variables.clone(),
            expires_at: Instant::now() + ttl,
            hit_count: 0,
        };
        self.store.lock().insert_with_size(key, entry, size);
    }

    /// Remove entries whose key matches the pattern; returns the count
    pub fn invalidate(&self, pattern: &CachePattern) -> usize {
        let mut store = self.store.lock();
        let before = store.len();
        store.retain(|key, _| !pattern.matches(key));
        before - store.len()
    }

    /// Invalidate cached queries plausibly affected by a mutation
    ///
    /// Candidates come from the swappable target extractor: entity tokens
    /// derived from the mutation's root field (verb prefix stripped) and
    /// `name=value` tokens for identifying variables. An entry is dropped
    /// when its operation name contains an entity token or its recorded
    /// variables share an identifying value. Best effort by design.
    pub fn invalidate_for_mutation(&self, mutation: &str, variables: &Value) -> usize {
        let tokens = (self.mutation_targets)(mutation, variables);
        if tokens.is_empty() {
            return 0;
        }

        let mut store = self.store.lock();
        let before = store.len();
        store.retain(|_, entry| !entry_matches_targets(entry, &tokens));
        let removed = before - store.len();
        if removed > 0 {
            tracing::debug!(removed, "invalidated GraphQL entries after mutation");
        }
        removed
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.store.lock().clear();
    }

    /// Full stats surface: counters, hot queries, efficiency, memory
    pub fn stats(&self) -> GraphQLCacheStats {
        let store = self.store.lock();
        let lru = store.stats();

        let mut per_operation: HashMap<&str, u64> = HashMap::new();
        for (_, entry) in store.iter() {
            *per_operation.entry(entry.operation.as_str()).or_default() += entry.hit_count;
        }
        let mut top_queries: Vec<TopQuery> = per_operation
            .into_iter()
            .map(|(operation, hit_count)| TopQuery {
                operation: operation.to_string(),
                hit_count,
            })
            .collect();
        top_queries.sort_by(|a, b| b.hit_count.cmp(&a.hit_count).then(a.operation.cmp(&b.operation)));
        top_queries.truncate(5);

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        GraphQLCacheStats {
            general: GraphQLCacheCounters {
                entries: lru.entries,
                hits,
                misses,
                stale_served: self.stale_served.load(Ordering::Relaxed),
                evictions: lru.evictions,
            },
            top_queries,
            cache_efficiency: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            memory_summary: MemorySummary {
                approx_bytes: lru.total_bytes,
                entries: lru.entries,
            },
        }
    }
}

fn entry_matches_targets(entry: &GraphQLEntry, tokens: &[String]) -> bool {
    let operation = entry.operation.to_ascii_lowercase();
    for token in tokens {
        match token.split_once('=') {
            Some((name, value)) => {
                let shared = entry
                    .variables
                    .get(name)
                    .map(|v| json_scalar_text(v) == value)
                    .unwrap_or(false);
                if shared {
                    return true;
                }
            }
            None => {
                if operation.contains(token.as_str()) {
                    return true;
                }
            }
        }
    }
    false
}

/// Whether the document's top-level operation is a mutation
pub fn is_mutation(query: &str) -> bool {
    query.trim_start().starts_with("mutation")
}

/// Collapse all whitespace runs so formatting differences share a key
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn operation_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:query|mutation|subscription)\s+([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static pattern")
    })
}

fn root_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\s*([A-Za-z_][A-Za-z0-9_]*)").expect("static pattern"))
}

/// Best-effort query text -> operation name
///
/// Prefers the explicit operation name; falls back to the first root field.
pub fn extract_operation_name(query: &str) -> Option<String> {
    if let Some(captures) = operation_name_re().captures(query) {
        return captures.get(1).map(|m| m.as_str().to_string());
    }
    root_field_re()
        .captures(query)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort mutation -> candidate invalidation tokens
///
/// Produces lowercase entity tokens (root field with its verb prefix
/// stripped) plus `name=value` tokens for identifying variables.
pub fn extract_mutation_targets(mutation: &str, variables: &Value) -> Vec<String> {
    let mut tokens = Vec::new();

    let root = root_field_re()
        .captures(mutation)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase());
    if let Some(root) = root {
        let entity = MUTATION_VERBS
            .iter()
            .find_map(|verb| root.strip_prefix(verb))
            .unwrap_or(root.as_str());
        if !entity.is_empty() {
            tokens.push(entity.to_string());
        }
    }

    if let Some(map) = variables.as_object() {
        for name in IDENTIFYING_VARIABLES {
            if let Some(value) = map.get(*name) {
                let text = json_scalar_text(value);
                if !text.is_empty() {
                    tokens.push(format!("{}={}", name, text));
                }
            }
        }
    }

    tokens
}

fn json_scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// GraphQL cache counters
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphQLCacheCounters {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_served: u64,
    pub evictions: u64,
}

/// Hot query summary
#[derive(Debug, Clone, serde::Serialize)]
pub struct TopQuery {
    pub operation: String,
    pub hit_count: u64,
}

/// Approximate memory footprint
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MemorySummary {
    pub approx_bytes: usize,
    pub entries: usize,
}

/// Full GraphQL cache stats surface
#[derive(Debug, Clone, serde::Serialize)]
pub struct GraphQLCacheStats {
    pub general: GraphQLCacheCounters,
    pub top_queries: Vec<TopQuery>,
    pub cache_efficiency: f64,
    pub memory_summary: MemorySummary,
}
