//! Access-layer error types
//!
//! ApiError는 업스트림 API 관련 세부 에러를 관리합니다.
//! Every error maps to an [`ErrorKind`], which is the unit the retry policy
//! whitelists against - classification stays pluggable instead of being
//! hardcoded to one upstream's error shape.

use thiserror::Error;

/// Coarse error classification checked against a retry policy's whitelist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient network failure (connection reset, DNS, timeout)
    Network,
    /// Primary rate limit exhausted
    RateLimit,
    /// Secondary/abuse rate limit (needs a larger backoff)
    SecondaryRateLimit,
    /// Caller-input problem; retrying cannot help
    Validation,
    /// Unclassified upstream failure (5xx and friends)
    Upstream,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::SecondaryRateLimit => "secondary_rate_limit",
            ErrorKind::Validation => "validation",
            ErrorKind::Upstream => "upstream",
        }
    }
}

/// Errors that can occur during access-layer operations
///
/// Clone is required: a single in-flight failure is delivered to every
/// caller coalesced onto the same deduplicated request.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Transient network failure
    #[error("Network error: {0}")]
    Network(String),

    /// Primary rate limit exceeded
    #[error("Rate limit exceeded{}", .retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    /// Secondary (abuse) rate limit exceeded
    #[error("Secondary rate limit exceeded{}", .retry_after_ms.map(|ms| format!(", retry after {}ms", ms)).unwrap_or_default())]
    SecondaryRateLimit { retry_after_ms: Option<u64> },

    /// Invalid request (bad parameters)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unclassified upstream failure
    #[error("Upstream error: HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response could not be decoded
    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// Classify this error for retry decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::RateLimited { .. } => ErrorKind::RateLimit,
            ApiError::SecondaryRateLimit { .. } => ErrorKind::SecondaryRateLimit,
            ApiError::Validation(_) | ApiError::Deserialization(_) => ErrorKind::Validation,
            ApiError::Upstream { .. } => ErrorKind::Upstream,
        }
    }

    /// Create from an HTTP status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_ascii_lowercase();
        match status {
            403 | 429 if lower.contains("secondary rate limit") || lower.contains("abuse") => {
                ApiError::SecondaryRateLimit {
                    retry_after_ms: extract_retry_after(body),
                }
            }
            429 => ApiError::RateLimited {
                retry_after_ms: extract_retry_after(body),
            },
            403 if lower.contains("rate limit") => ApiError::RateLimited {
                retry_after_ms: extract_retry_after(body),
            },
            400..=499 => ApiError::Validation(format!("HTTP {}: {}", status, body)),
            _ => ApiError::Upstream {
                status,
                message: body.to_string(),
            },
        }
    }

    /// Rate-limit reset hint, if this error carries one (milliseconds)
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited { retry_after_ms }
            | ApiError::SecondaryRateLimit { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Try to extract a retry-after value from an error body (in milliseconds)
fn extract_retry_after(body: &str) -> Option<u64> {
    // Try to find retry_after in JSON (top-level or nested under "error")
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let secs = json
            .get("retry_after")
            .and_then(|v| v.as_f64())
            .or_else(|| {
                json.get("error")
                    .and_then(|e| e.get("retry_after"))
                    .and_then(|v| v.as_f64())
            });
        if let Some(secs) = secs {
            return Some((secs * 1000.0) as u64);
        }
    }

    // Try to find in plain text ("retry after 30 seconds")
    if let Some(idx) = body.to_ascii_lowercase().find("retry") {
        let after = &body[idx..];
        let num_str: String = after
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();

        if let Ok(secs) = num_str.parse::<f64>() {
            return Some((secs * 1000.0) as u64);
        }
    }

    None
}
