//! # relay-foundation
//!
//! Foundation layer for Relay:
//! - Error: 중앙 에러 타입 (Error, Result)
//! - Config: 통합 설정 (AccessConfig + per-component settings)
//! - Cache: 캐시 기본 요소 (LRU store, canonical JSON keys)
//!
//! Everything above this layer (the access layer itself) builds on these
//! primitives; nothing here knows about HTTP, GraphQL, or retries.

pub mod cache;
pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    AccessConfig, CacheSettings, DedupSettings, GraphQLCacheSettings, MetricsSettings,
    PaginationSettings, RetrySettings,
};

// ============================================================================
// Cache primitives
// ============================================================================
pub use cache::{canonical_json, hash_json, LruCache, LruStats};
