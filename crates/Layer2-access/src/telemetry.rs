//! Telemetry sink for retry and outcome events
//!
//! The reliability manager reports structured events through this trait so
//! consumers can route them wherever they want (tracing, counters, test
//! capture). The default sink logs through `tracing`.

use std::time::Duration;

use crate::error::{ApiError, ErrorKind};

/// A retry is about to be scheduled
#[derive(Debug)]
pub struct RetryEvent<'a> {
    /// Logical operation name
    pub operation: &'a str,
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    /// Delay before the next attempt
    pub delay: Duration,
    /// Classification of the failure
    pub kind: ErrorKind,
    /// The failure itself
    pub error: &'a ApiError,
}

/// A call settled (success, exhaustion, or non-retryable failure)
#[derive(Debug)]
pub struct OutcomeEvent<'a> {
    /// Logical operation name
    pub operation: &'a str,
    /// Whether the call ultimately succeeded
    pub success: bool,
    /// Total attempts made
    pub attempts: u32,
    /// Wall-clock time across all attempts and waits
    pub elapsed: Duration,
}

/// Pluggable sink receiving structured retry/metric events
pub trait Telemetry: Send + Sync {
    fn on_retry(&self, event: &RetryEvent<'_>);
    fn on_outcome(&self, event: &OutcomeEvent<'_>);
}

/// Default sink: structured logs through `tracing`
#[derive(Debug, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        tracing::warn!(
            operation = event.operation,
            attempt = event.attempt,
            delay_ms = event.delay.as_millis() as u64,
            kind = event.kind.as_str(),
            "retrying after {}",
            event.error
        );
    }

    fn on_outcome(&self, event: &OutcomeEvent<'_>) {
        if event.success {
            tracing::debug!(
                operation = event.operation,
                attempts = event.attempts,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "call succeeded"
            );
        } else {
            tracing::warn!(
                operation = event.operation,
                attempts = event.attempts,
                elapsed_ms = event.elapsed.as_millis() as u64,
                "call failed"
            );
        }
    }
}

/// Sink that drops every event (tests, benchmarks)
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn on_retry(&self, _event: &RetryEvent<'_>) {}
    fn on_outcome(&self, _event: &OutcomeEvent<'_>) {}
}
