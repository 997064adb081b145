//! Access layer configuration
//!
//! All knobs for the access layer live here: cache sizing and TTLs, dedup
//! bookkeeping bounds, retry/backoff, metrics retention and pagination
//! defaults. Every field has a serde default so a partial TOML table (or no
//! config at all) always produces a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Top-level access layer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessConfig {
    /// REST-style response cache settings
    #[serde(default)]
    pub cache: CacheSettings,

    /// GraphQL cache settings
    #[serde(default)]
    pub graphql: GraphQLCacheSettings,

    /// Request deduplication settings
    #[serde(default)]
    pub dedup: DedupSettings,

    /// Retry/backoff settings
    #[serde(default)]
    pub retry: RetrySettings,

    /// Performance monitoring settings
    #[serde(default)]
    pub metrics: MetricsSettings,

    /// Pagination defaults
    #[serde(default)]
    pub pagination: PaginationSettings,
}

impl AccessConfig {
    /// Parse a configuration from a TOML string
    ///
    /// Missing tables and fields fall back to their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of cached responses
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    /// Default TTL for cached responses (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Per-operation TTL overrides (milliseconds)
    ///
    /// Read-heavy, slow-changing operations (repository metadata, user
    /// profiles) get longer TTLs than volatile ones (notifications, search).
    #[serde(default)]
    pub operation_ttl_ms: HashMap<String, u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            default_ttl_ms: default_cache_ttl_ms(),
            operation_ttl_ms: HashMap::new(),
        }
    }
}

impl CacheSettings {
    /// Resolve the default TTL for an operation (milliseconds)
    pub fn ttl_for_operation(&self, operation: &str) -> u64 {
        self.operation_ttl_ms
            .get(operation)
            .copied()
            .unwrap_or(self.default_ttl_ms)
    }
}

/// GraphQL cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLCacheSettings {
    /// Maximum number of cached query results
    #[serde(default = "default_graphql_entries")]
    pub max_entries: usize,

    /// Default TTL for cached query results (milliseconds)
    #[serde(default = "default_graphql_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for GraphQLCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: default_graphql_entries(),
            default_ttl_ms: default_graphql_ttl_ms(),
        }
    }
}

/// Request deduplication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupSettings {
    /// How long a pending entry may coalesce new callers (milliseconds)
    ///
    /// An in-flight entry older than this is dropped from the pending table
    /// so later callers issue their own fetch instead of waiting on a
    /// possibly-stuck call. The underlying call itself is not cancelled.
    #[serde(default = "default_max_pending_ms")]
    pub max_pending_ms: u64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            max_pending_ms: default_max_pending_ms(),
        }
    }
}

/// Backoff curve between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Delay doubles per retry: `base * 2^(n-1)` before retry n
    #[default]
    Exponential,
    /// Delay grows linearly: `base * n` before retry n
    Linear,
}

/// Retry/backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Maximum total attempts (first try included)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between retries (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Cap on any computed delay (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff curve
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Perturb delays to avoid synchronized retries across clients
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffKind::default(),
            jitter: default_jitter(),
        }
    }
}

/// Performance monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Maximum retained samples (oldest evicted first)
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Operations slower than this are flagged in reports (milliseconds)
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,

    /// Error rate above this is flagged in reports (0.0 - 1.0)
    #[serde(default = "default_error_rate_threshold")]
    pub error_rate_threshold: f64,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            slow_threshold_ms: default_slow_threshold_ms(),
            error_rate_threshold: default_error_rate_threshold(),
        }
    }
}

/// Pagination defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationSettings {
    /// Default page size for offset pagination
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Default page size for cursor pagination
    #[serde(default = "default_first")]
    pub first: u32,

    /// Default maximum pages per paginated call
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Default maximum accumulated items per paginated call
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl Default for PaginationSettings {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            first: default_first(),
            max_pages: default_max_pages(),
            max_items: default_max_items(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_cache_entries() -> usize {
    500
}

fn default_cache_ttl_ms() -> u64 {
    30_000
}

fn default_graphql_entries() -> usize {
    200
}

fn default_graphql_ttl_ms() -> u64 {
    60_000
}

fn default_max_pending_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_max_samples() -> usize {
    1_000
}

fn default_slow_threshold_ms() -> u64 {
    2_000
}

fn default_error_rate_threshold() -> f64 {
    0.1
}

fn default_per_page() -> u32 {
    30
}

fn default_first() -> u32 {
    50
}

fn default_max_pages() -> u32 {
    10
}

fn default_max_items() -> usize {
    1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AccessConfig::default();
        assert_eq!(config.cache.max_entries, 500);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, BackoffKind::Exponential);
        assert!(config.retry.jitter);
    }

    #[test]
    fn test_partial_toml() {
        let config = AccessConfig::from_toml_str(
            r#"
            [cache]
            default_ttl_ms = 5000

            [retry]
            backoff = "linear"
            jitter = false
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.default_ttl_ms, 5000);
        assert_eq!(config.cache.max_entries, 500); // default fills in
        assert_eq!(config.retry.backoff, BackoffKind::Linear);
        assert!(!config.retry.jitter);
        assert_eq!(config.dedup.max_pending_ms, 30_000);
    }

    #[test]
    fn test_operation_ttl_lookup() {
        let mut settings = CacheSettings::default();
        settings
            .operation_ttl_ms
            .insert("get_repository".to_string(), 120_000);

        assert_eq!(settings.ttl_for_operation("get_repository"), 120_000);
        assert_eq!(settings.ttl_for_operation("list_issues"), 30_000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AccessConfig::from_toml_str("cache = 3").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
