//! Retry logic with configurable backoff
//!
//! Per-call state machine: attempt, classify the failure, wait out the
//! backoff, attempt again until success, exhaustion, or a non-retryable
//! error. On exhaustion the last error is returned unmodified.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use relay_foundation::config::{BackoffKind, RetrySettings};

use crate::error::{ApiError, ErrorKind};
use crate::telemetry::{OutcomeEvent, RetryEvent, Telemetry, TracingTelemetry};

/// Secondary rate limits back off harder than the computed curve
const SECONDARY_RATE_LIMIT_MULTIPLIER: u32 = 2;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts (first try included)
    pub max_attempts: u32,

    /// Base delay between retries (milliseconds)
    pub base_delay_ms: u64,

    /// Cap on any computed delay (milliseconds)
    pub max_delay_ms: u64,

    /// Backoff curve
    pub backoff: BackoffKind,

    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,

    /// Error kinds eligible for retry; everything else fails fast
    pub retryable: Vec<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    /// Build a policy from configuration, with the default retryable set
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff: settings.backoff,
            jitter: settings.jitter,
            retryable: vec![
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::SecondaryRateLimit,
            ],
        }
    }

    /// Create a policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Replace the retryable kinds
    pub fn with_retryable(mut self, kinds: Vec<ErrorKind>) -> Self {
        self.retryable = kinds;
        self
    }

    /// Check whether an error kind is eligible for retry
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Calculate the delay before retry `n` (1-indexed)
    ///
    /// Exponential: `base * 2^(n-1)`; linear: `base * n`; both capped at
    /// `max_delay_ms`. Jitter perturbs the result by a uniform 0.8-1.2
    /// factor.
    pub fn delay_before_retry(&self, n: u32) -> Duration {
        let n = n.max(1);
        let raw_ms = match self.backoff {
            BackoffKind::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(n - 1)),
            BackoffKind::Linear => self.base_delay_ms.saturating_mul(n as u64),
        };
        let capped_ms = raw_ms.min(self.max_delay_ms);

        let final_ms = if self.jitter {
            use rand::Rng;
            let factor: f64 = 0.8 + rand::thread_rng().gen::<f64>() * 0.4;
            (capped_ms as f64 * factor) as u64
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Retries failed operations per a configurable backoff policy
///
/// Emits a [`RetryEvent`] to the telemetry sink before every wait and an
/// [`OutcomeEvent`] once the call settles.
pub struct ReliabilityManager {
    policy: RetryPolicy,
    telemetry: Arc<dyn Telemetry>,
}

impl ReliabilityManager {
    /// Create a manager with the given policy and the tracing sink
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            telemetry: Arc::new(TracingTelemetry),
        }
    }

    /// Replace the telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Get the configured policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation with the manager's policy
    pub async fn execute<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        self.execute_with_policy(operation, &self.policy, f).await
    }

    /// Execute an operation with an explicit policy override
    pub async fn execute_with_policy<T, F, Fut>(
        &self,
        operation: &str,
        policy: &RetryPolicy,
        mut f: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        let started = std::time::Instant::now();
        let mut attempt: u32 = 1;

        loop {
            match f().await {
                Ok(value) => {
                    self.telemetry.on_outcome(&OutcomeEvent {
                        operation,
                        success: true,
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                    return Ok(value);
                }
                Err(err) => {
                    let kind = err.kind();
                    if !policy.is_retryable(kind) || attempt >= policy.max_attempts {
                        self.telemetry.on_outcome(&OutcomeEvent {
                            operation,
                            success: false,
                            attempts: attempt,
                            elapsed: started.elapsed(),
                        });
                        return Err(err);
                    }

                    let delay = delay_for_error(policy, &err, attempt);
                    self.telemetry.on_retry(&RetryEvent {
                        operation,
                        attempt,
                        delay,
                        kind,
                        error: &err,
                    });

                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for ReliabilityManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

/// Pick the wait before the next attempt
///
/// A primary rate-limit reset hint is honored verbatim when present.
/// Secondary rate limits ignore their (often absent or misleading) hint and
/// back off on the computed curve with a fixed multiplier instead.
fn delay_for_error(policy: &RetryPolicy, err: &ApiError, failed_attempt: u32) -> Duration {
    match err {
        ApiError::RateLimited {
            retry_after_ms: Some(ms),
        } => Duration::from_millis(*ms),
        ApiError::SecondaryRateLimit { .. } => {
            let base = policy.delay_before_retry(failed_attempt);
            std::cmp::min(
                base * SECONDARY_RATE_LIMIT_MULTIPLIER,
                Duration::from_millis(policy.max_delay_ms),
            )
        }
        _ => policy.delay_before_retry(failed_attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(backoff: BackoffKind) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            backoff,
            jitter: false,
            retryable: vec![
                ErrorKind::Network,
                ErrorKind::RateLimit,
                ErrorKind::SecondaryRateLimit,
            ],
        }
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff: BackoffKind::Exponential,
            jitter: false,
            retryable: vec![ErrorKind::Network],
        };

        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before_retry(10), Duration::from_millis(30_000)); // capped
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            backoff: BackoffKind::Linear,
            base_delay_ms: 100,
            max_delay_ms: 250,
            jitter: false,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.delay_before_retry(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before_retry(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before_retry(3), Duration::from_millis(250)); // capped
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
            ..RetryPolicy::default()
        };

        for _ in 0..100 {
            let d = policy.delay_before_retry(1).as_millis() as u64;
            assert!((800..=1200).contains(&d), "delay {} out of bounds", d);
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let manager = ReliabilityManager::new(fast_policy(BackoffKind::Exponential));
        let calls = AtomicU32::new(0);

        let result = manager
            .execute("op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(ApiError::Network("reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error_after_max_attempts() {
        let manager = ReliabilityManager::new(fast_policy(BackoffKind::Linear));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = manager
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Network("still down".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_validation_error_fails_fast() {
        let manager = ReliabilityManager::new(fast_policy(BackoffKind::Exponential));
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = manager
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Validation("bad field".into()))
            })
            .await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_retries_only_when_whitelisted() {
        let policy = fast_policy(BackoffKind::Exponential).with_retryable(vec![
            ErrorKind::Network,
            ErrorKind::Upstream,
        ]);
        let manager = ReliabilityManager::new(policy);
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = manager
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ApiError::Upstream {
                    status: 502,
                    message: "bad gateway".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rate_limit_hint_is_honored() {
        let policy = fast_policy(BackoffKind::Exponential);
        let err = ApiError::RateLimited {
            retry_after_ms: Some(1234),
        };
        assert_eq!(
            delay_for_error(&policy, &err, 1),
            Duration::from_millis(1234)
        );
    }

    #[test]
    fn test_secondary_rate_limit_backs_off_harder() {
        let policy = RetryPolicy {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            jitter: false,
            ..fast_policy(BackoffKind::Exponential)
        };
        let err = ApiError::SecondaryRateLimit {
            retry_after_ms: Some(1),
        };
        // Hint ignored; computed delay doubled
        assert_eq!(
            delay_for_error(&policy, &err, 1),
            Duration::from_millis(200)
        );
    }
}
