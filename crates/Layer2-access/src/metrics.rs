//! Performance instrumentation
//!
//! Samples are appended to a bounded ring buffer (oldest evicted first);
//! aggregates are computed on demand and never persisted. Threshold flags
//! (slow operation, high error rate) are informational only - they annotate
//! reports and never block execution.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use relay_foundation::config::MetricsSettings;

use crate::error::ApiError;

/// One measured call
#[derive(Debug, Clone)]
pub struct MetricSample {
    pub operation: String,
    pub duration: Duration,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Derived per-operation view; zeroed when no samples exist
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct OperationStats {
    pub operation: String,
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
    pub error_rate: f64,
    /// Average duration exceeds the slow threshold
    pub slow: bool,
    /// Error rate exceeds the configured threshold
    pub high_error_rate: bool,
}

/// Measures and aggregates per-operation latency/error statistics
pub struct PerformanceMonitor {
    samples: Mutex<std::collections::VecDeque<MetricSample>>,
    max_samples: usize,
    slow_threshold: Duration,
    error_rate_threshold: f64,
}

impl PerformanceMonitor {
    pub fn new(settings: &MetricsSettings) -> Self {
        Self {
            samples: Mutex::new(std::collections::VecDeque::with_capacity(
                settings.max_samples.min(1024),
            )),
            max_samples: settings.max_samples.max(1),
            slow_threshold: Duration::from_millis(settings.slow_threshold_ms),
            error_rate_threshold: settings.error_rate_threshold,
        }
    }

    /// Run a future, record a sample regardless of outcome, and pass the
    /// outcome through unchanged
    pub async fn measure<T, F>(&self, operation: &str, fut: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let started = Instant::now();
        let result = fut.await;
        self.record(operation, started.elapsed(), result.is_ok());
        result
    }

    /// Append a sample, evicting the oldest at capacity
    pub fn record(&self, operation: &str, duration: Duration, success: bool) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(MetricSample {
            operation: operation.to_string(),
            duration,
            success,
            timestamp: Utc::now(),
        });
    }

    /// Compute per-operation aggregates from retained samples
    pub fn aggregated(&self) -> HashMap<String, OperationStats> {
        let samples = self.samples.lock();
        let mut grouped: HashMap<&str, Vec<&MetricSample>> = HashMap::new();
        for sample in samples.iter() {
            grouped.entry(sample.operation.as_str()).or_default().push(sample);
        }

        grouped
            .into_iter()
            .map(|(operation, group)| {
                (operation.to_string(), self.stats_from(operation, &group))
            })
            .collect()
    }

    /// Aggregates for one operation; zeroed stats when it has no samples
    pub fn stats_for(&self, operation: &str) -> OperationStats {
        self.aggregated()
            .remove(operation)
            .unwrap_or_else(|| OperationStats {
                operation: operation.to_string(),
                ..OperationStats::default()
            })
    }

    fn stats_from(&self, operation: &str, group: &[&MetricSample]) -> OperationStats {
        let count = group.len();
        let mut durations_ms: Vec<f64> = group
            .iter()
            .map(|s| s.duration.as_secs_f64() * 1000.0)
            .collect();
        durations_ms.sort_by(|a, b| a.total_cmp(b));

        let sum: f64 = durations_ms.iter().sum();
        let avg_ms = if count == 0 { 0.0 } else { sum / count as f64 };
        let errors = group.iter().filter(|s| !s.success).count();
        let error_rate = if count == 0 {
            0.0
        } else {
            errors as f64 / count as f64
        };

        OperationStats {
            operation: operation.to_string(),
            count,
            avg_ms,
            p50_ms: percentile(&durations_ms, 50.0),
            p95_ms: percentile(&durations_ms, 95.0),
            max_ms: durations_ms.last().copied().unwrap_or(0.0),
            error_rate,
            slow: avg_ms > self.slow_threshold.as_secs_f64() * 1000.0,
            high_error_rate: error_rate > self.error_rate_threshold,
        }
    }

    /// Human-readable summary of every tracked operation
    pub fn report(&self) -> String {
        let mut stats: Vec<OperationStats> = self.aggregated().into_values().collect();
        stats.sort_by(|a, b| a.operation.cmp(&b.operation));

        if stats.is_empty() {
            return "No samples recorded.".to_string();
        }

        let mut out = String::from(
            "operation                        count   avg_ms   p95_ms  err_rate  flags\n",
        );
        for s in stats {
            let mut flags = Vec::new();
            if s.slow {
                flags.push("SLOW");
            }
            if s.high_error_rate {
                flags.push("HIGH-ERROR");
            }
            out.push_str(&format!(
                "{:<32} {:>5} {:>8.1} {:>8.1} {:>8.2}  {}\n",
                s.operation,
                s.count,
                s.avg_ms,
                s.p95_ms,
                s.error_rate,
                flags.join(",")
            ));
        }
        out
    }

    /// Number of retained samples
    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Drop all samples
    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

/// Nearest-rank percentile over sorted millisecond durations
fn percentile(sorted_ms: &[f64], p: f64) -> f64 {
    if sorted_ms.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted_ms.len() as f64).ceil() as usize;
    sorted_ms[rank.clamp(1, sorted_ms.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monitor(max_samples: usize) -> PerformanceMonitor {
        PerformanceMonitor::new(&MetricsSettings {
            max_samples,
            slow_threshold_ms: 50,
            error_rate_threshold: 0.25,
        })
    }

    #[tokio::test]
    async fn test_measure_passes_result_through() {
        let m = monitor(100);

        let ok = m.measure("op", async { Ok(json!(1)) }).await;
        assert_eq!(ok.unwrap(), json!(1));

        let err: Result<(), _> = m
            .measure("op", async { Err(ApiError::Network("down".into())) })
            .await;
        assert!(matches!(err, Err(ApiError::Network(_))));

        assert_eq!(m.sample_count(), 2);
        let stats = m.stats_for("op");
        assert_eq!(stats.count, 2);
        assert!((stats.error_rate - 0.5).abs() < f64::EPSILON);
        assert!(stats.high_error_rate);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let m = monitor(3);
        for i in 0..5 {
            m.record(&format!("op{}", i), Duration::from_millis(1), true);
        }
        assert_eq!(m.sample_count(), 3);
        // op0/op1 fell off the front
        assert_eq!(m.stats_for("op0").count, 0);
        assert_eq!(m.stats_for("op4").count, 1);
    }

    #[test]
    fn test_zeroed_stats_for_unknown_operation() {
        let m = monitor(10);
        let stats = m.stats_for("never_called");
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_ms, 0.0);
        assert_eq!(stats.error_rate, 0.0);
        assert!(!stats.slow);
    }

    #[test]
    fn test_percentiles() {
        let m = monitor(100);
        for i in 1..=100u64 {
            m.record("op", Duration::from_millis(i), true);
        }
        let stats = m.stats_for("op");
        assert!((stats.p50_ms - 50.0).abs() < 0.5);
        assert!((stats.p95_ms - 95.0).abs() < 0.5);
        assert!((stats.max_ms - 100.0).abs() < 0.5);
        assert!((stats.avg_ms - 50.5).abs() < 0.5);
    }

    #[test]
    fn test_slow_flag() {
        let m = monitor(10);
        m.record("slow_op", Duration::from_millis(200), true);
        assert!(m.stats_for("slow_op").slow);
        m.record("fast_op", Duration::from_millis(1), true);
        assert!(!m.stats_for("fast_op").slow);
    }

    #[test]
    fn test_report_mentions_flags() {
        let m = monitor(10);
        m.record("bad_op", Duration::from_millis(200), false);
        let report = m.report();
        assert!(report.contains("bad_op"));
        assert!(report.contains("SLOW"));
        assert!(report.contains("HIGH-ERROR"));

        let empty = monitor(10);
        assert_eq!(empty.report(), "No samples recorded.");
    }
}
