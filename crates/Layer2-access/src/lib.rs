//! # relay-access
//!
//! Resilient access layer for rate-limited paginated APIs:
//! - Cache: 응답 캐시 (TTL + LRU), GraphQL 전용 캐시 (stale-on-error)
//! - Dedup: 동시 동일 요청 병합 (single in-flight fetch)
//! - Retry: 백오프 재시도 (rate-limit aware)
//! - Metrics: 성능 측정 (bounded ring buffer)
//! - Pagination: offset/cursor 페이지 수집
//!
//! [`AccessLayer`] composes everything: deduplication innermost around the
//! caller's fetch, caching around that, measurement outermost. The layer
//! never performs I/O itself; callers supply fetch futures.

pub mod cache;
pub mod dedup;
pub mod error;
pub mod graphql;
pub mod layer;
pub mod metrics;
pub mod pagination;
pub mod params;
pub mod retry;
pub mod telemetry;

// ============================================================================
// Errors
// ============================================================================
pub use error::{ApiError, ErrorKind};

// ============================================================================
// Facade
// ============================================================================
pub use layer::{AccessLayer, LayerMetrics};
pub use params::{CallOptions, GraphQLOptions, Params};

// ============================================================================
// Components
// ============================================================================
pub use cache::{CachePattern, CacheStats, ResponseCache};
pub use dedup::{DedupStats, InFlight, RequestDeduplicator, SharedOutcome};
pub use graphql::{GraphQLCache, GraphQLCacheStats};
pub use metrics::{MetricSample, OperationStats, PerformanceMonitor};
pub use pagination::{
    CursorOptions, CursorPage, CursorRequest, CursorResult, OffsetOptions, OffsetResult,
    PageInfo, PaginationEngine,
};
pub use retry::{ReliabilityManager, RetryPolicy};
pub use telemetry::{NoopTelemetry, Telemetry, TracingTelemetry};
