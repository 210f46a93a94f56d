//! Thread-safe aggregation of iteration results.
//!
//! [`MetricsCollector`] is the single shared sink every virtual user records
//! into. Counters and the HdrHistogram latency distribution live behind one
//! lock, so [`MetricsCollector::snapshot`] always observes whole records.
//!
//! # Design
//!
//! - **Commutative**: every field is a counter or a histogram bucket, and
//!   per-key maps are `BTreeMap`s, so record order never changes a snapshot.
//! - **Response latency only**: the histogram holds latencies of iterations
//!   that received a response. Timeouts and connection failures are counted
//!   but kept out of the distribution.
//! - **Millisecond resolution**, 3 significant figures, auto-resize.

use std::collections::BTreeMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::loadtest::executor::RequestResult;

/// Pass/fail totals for one named check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckCounts {
    pub passed: u64,
    pub failed: u64,
}

impl CheckCounts {
    /// Total evaluations.
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Fraction passed (0.0..=1.0). Returns 0.0 when never evaluated.
    pub fn pass_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.passed as f64 / total as f64
    }
}

/// Latency distribution summary. All values in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p90: u64,
    pub p95: u64,
    pub p99: u64,
}

impl LatencySummary {
    fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            count: histogram.len(),
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p95: histogram.value_at_quantile(0.95),
            p99: histogram.value_at_quantile(0.99),
        }
    }

    /// Value at one of the reported percentiles (50, 90, 95, 99, or 100 for max).
    pub fn at_percentile(&self, percentile: u8) -> Option<u64> {
        match percentile {
            50 => Some(self.p50),
            90 => Some(self.p90),
            95 => Some(self.p95),
            99 => Some(self.p99),
            100 => Some(self.max),
            _ => None,
        }
    }
}

/// Point-in-time view of all aggregated counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    /// Iterations recorded (one per [`RequestResult`]).
    pub total_iterations: u64,
    /// Check evaluations that passed, across all checks.
    pub checks_passed: u64,
    /// Check evaluations that failed, across all checks.
    pub checks_failed: u64,
    /// Iterations that produced no response.
    pub requests_errored: u64,
    /// Totals keyed by check name.
    pub per_check: BTreeMap<String, CheckCounts>,
    /// Errored iterations keyed by [`ErrorKind::category`](crate::loadtest::error::ErrorKind::category).
    pub error_categories: BTreeMap<String, u64>,
    /// Responses keyed by status code.
    pub status_codes: BTreeMap<u16, u64>,
    /// Latency of iterations that received a response.
    pub latency: LatencySummary,
}

impl AggregateMetrics {
    /// Fraction of iterations that errored (0.0..=1.0).
    pub fn error_rate(&self) -> f64 {
        if self.total_iterations == 0 {
            return 0.0;
        }
        self.requests_errored as f64 / self.total_iterations as f64
    }

    /// Fraction of all check evaluations that passed (0.0..=1.0).
    ///
    /// Returns 0.0 when no check was ever evaluated.
    pub fn check_pass_rate(&self) -> f64 {
        let total = self.checks_passed + self.checks_failed;
        if total == 0 {
            return 0.0;
        }
        self.checks_passed as f64 / total as f64
    }

    /// Pass/fail totals for one check, if it was ever evaluated.
    pub fn check(&self, name: &str) -> Option<CheckCounts> {
        self.per_check.get(name).copied()
    }
}

struct Accumulator {
    latency: Histogram<u64>,
    metrics: AggregateMetrics,
}

impl Accumulator {
    fn new() -> Self {
        let mut latency = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
        latency.auto(true);
        Self {
            latency,
            metrics: AggregateMetrics::default(),
        }
    }

    fn record(&mut self, result: &RequestResult) {
        let m = &mut self.metrics;
        m.total_iterations += 1;

        for (name, passed) in &result.check_outcomes {
            let counts = m.per_check.entry(name.clone()).or_default();
            if *passed {
                counts.passed += 1;
                m.checks_passed += 1;
            } else {
                counts.failed += 1;
                m.checks_failed += 1;
            }
        }

        match (&result.error, result.status_code) {
            (Some(err), _) => {
                m.requests_errored += 1;
                *m.error_categories
                    .entry(err.category().to_owned())
                    .or_insert(0) += 1;
            },
            (None, Some(status)) => {
                *m.status_codes.entry(status).or_insert(0) += 1;
                let ms = duration_ms(result.latency);
                if let Err(e) = self.latency.record(ms) {
                    debug!(latency_ms = ms, error = ?e, "latency not recorded in histogram");
                }
            },
            (None, None) => {},
        }
    }

    fn snapshot(&self) -> AggregateMetrics {
        AggregateMetrics {
            latency: LatencySummary::from_histogram(&self.latency),
            ..self.metrics.clone()
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Shared, lock-protected metrics sink.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rampload::loadtest::executor::RequestResult;
/// use rampload::loadtest::metrics::MetricsCollector;
///
/// let collector = MetricsCollector::new();
/// collector.record(&RequestResult {
///     status_code: Some(200),
///     latency: Duration::from_millis(42),
///     error: None,
///     check_outcomes: vec![("status was 200".to_string(), true)],
/// });
///
/// let snapshot = collector.snapshot();
/// assert_eq!(snapshot.total_iterations, 1);
/// assert_eq!(snapshot.latency.p50, 42);
/// ```
pub struct MetricsCollector {
    inner: Mutex<Accumulator>,
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("total_iterations", &self.inner.lock().metrics.total_iterations)
            .finish()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Accumulator::new()),
        }
    }

    /// Fold one iteration result into the aggregate.
    pub fn record(&self, result: &RequestResult) {
        self.inner.lock().record(result);
    }

    /// Copy the aggregate as of the last fully-applied record.
    pub fn snapshot(&self) -> AggregateMetrics {
        self.inner.lock().snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::error::ErrorKind;
    use std::sync::Arc;

    fn ok(status: u16, ms: u64, check_passed: bool) -> RequestResult {
        RequestResult {
            status_code: Some(status),
            latency: Duration::from_millis(ms),
            error: None,
            check_outcomes: vec![("status was 200".to_string(), check_passed)],
        }
    }

    fn timeout(ms: u64) -> RequestResult {
        RequestResult {
            status_code: None,
            latency: Duration::from_millis(ms),
            error: Some(ErrorKind::Timeout),
            check_outcomes: vec![("status was 200".to_string(), false)],
        }
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = MetricsCollector::new().snapshot();
        assert_eq!(snapshot, AggregateMetrics::default());
        assert_eq!(snapshot.error_rate(), 0.0);
        assert_eq!(snapshot.check_pass_rate(), 0.0);
    }

    #[test]
    fn test_extreme_latency_is_counted_without_panic() {
        let collector = MetricsCollector::new();
        collector.record(&RequestResult {
            status_code: Some(200),
            latency: Duration::MAX,
            error: None,
            check_outcomes: vec![],
        });
        collector.record(&ok(200, 10, true));

        let snap = collector.snapshot();
        assert_eq!(snap.total_iterations, 2);
        assert_eq!(snap.status_codes.get(&200), Some(&2));
        assert!(snap.latency.count >= 1);
    }

    #[test]
    fn test_counts_checks_and_statuses() {
        let collector = MetricsCollector::new();
        collector.record(&ok(200, 10, true));
        collector.record(&ok(200, 20, true));
        collector.record(&ok(500, 30, false));

        let s = collector.snapshot();
        assert_eq!(s.total_iterations, 3);
        assert_eq!(s.checks_passed, 2);
        assert_eq!(s.checks_failed, 1);
        assert_eq!(s.requests_errored, 0);
        assert_eq!(s.status_codes.get(&200), Some(&2));
        assert_eq!(s.status_codes.get(&500), Some(&1));
        assert_eq!(
            s.check("status was 200"),
            Some(CheckCounts {
                passed: 2,
                failed: 1
            })
        );
    }

    #[test]
    fn test_errors_are_counted_but_excluded_from_latency() {
        let collector = MetricsCollector::new();
        collector.record(&ok(200, 10, true));
        collector.record(&timeout(5000));

        let s = collector.snapshot();
        assert_eq!(s.requests_errored, 1);
        assert_eq!(s.error_categories.get("timeout"), Some(&1));
        assert_eq!(s.latency.count, 1);
        assert_eq!(s.latency.max, 10);
        assert!((s.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_percentiles() {
        let collector = MetricsCollector::new();
        for ms in 1..=100 {
            collector.record(&ok(200, ms, true));
        }
        let l = collector.snapshot().latency;
        assert_eq!(l.count, 100);
        assert_eq!(l.min, 1);
        assert_eq!(l.max, 100);
        assert_eq!(l.p50, 50);
        assert!((90..=91).contains(&l.p90), "p90 was {}", l.p90);
        assert!((99..=100).contains(&l.p99), "p99 was {}", l.p99);
        assert!((l.mean - 50.5).abs() < 0.1);
        assert_eq!(l.at_percentile(95), Some(l.p95));
        assert_eq!(l.at_percentile(100), Some(l.max));
        assert_eq!(l.at_percentile(75), None);
    }

    #[test]
    fn test_record_order_does_not_matter() {
        let results = [ok(200, 12, true), timeout(900), ok(503, 40, false)];

        let forward = MetricsCollector::new();
        results.iter().for_each(|r| forward.record(r));
        let reverse = MetricsCollector::new();
        results.iter().rev().for_each(|r| reverse.record(r));

        assert_eq!(forward.snapshot(), reverse.snapshot());
    }

    #[test]
    fn test_concurrent_records() {
        let collector = Arc::new(MetricsCollector::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = collector.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.record(&ok(200, 5, true));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let s = collector.snapshot();
        assert_eq!(s.total_iterations, 8000);
        assert_eq!(s.checks_passed, 8000);
    }
}
