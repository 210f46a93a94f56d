//! Post-run pass/fail criteria over aggregate metrics.
//!
//! ```toml
//! [[threshold]]
//! type = "check_pass_rate"
//! min = 0.95
//!
//! [[threshold]]
//! type = "latency"
//! percentile = 95
//! max = "500ms"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::loadtest::config::duration_str;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::AggregateMetrics;

/// Percentiles a latency threshold may reference (100 is the max).
pub const SUPPORTED_PERCENTILES: [u8; 5] = [50, 90, 95, 99, 100];

/// A `[[threshold]]` block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThresholdConfig {
    /// Check pass rate must be at least `min`. Applies to one named check,
    /// or to all check evaluations when `check` is omitted.
    CheckPassRate {
        min: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        check: Option<String>,
    },
    /// Fraction of errored iterations must not exceed `max`.
    ErrorRate { max: f64 },
    /// Response latency at `percentile` must not exceed `max`.
    Latency {
        percentile: u8,
        #[serde(with = "duration_str")]
        max: Duration,
    },
}

impl ThresholdConfig {
    /// Validate ranges and check references against the declared check names.
    pub fn validate(&self, check_names: &HashSet<&str>) -> Result<(), LoadTestError> {
        match self {
            Self::CheckPassRate { min, check } => {
                if !(0.0..=1.0).contains(min) {
                    return Err(LoadTestError::validation(format!(
                        "check_pass_rate threshold min must be within 0.0..=1.0, got {min}"
                    )));
                }
                match check {
                    Some(name) if !check_names.contains(name.as_str()) => {
                        Err(LoadTestError::validation(format!(
                            "check_pass_rate threshold references unknown check '{name}'"
                        )))
                    },
                    None if check_names.is_empty() => Err(LoadTestError::validation(
                        "check_pass_rate threshold requires at least one [[check]]",
                    )),
                    _ => Ok(()),
                }
            },
            Self::ErrorRate { max } => {
                if !(0.0..=1.0).contains(max) {
                    return Err(LoadTestError::validation(format!(
                        "error_rate threshold max must be within 0.0..=1.0, got {max}"
                    )));
                }
                Ok(())
            },
            Self::Latency { percentile, .. } => {
                if !SUPPORTED_PERCENTILES.contains(percentile) {
                    return Err(LoadTestError::validation(format!(
                        "latency threshold percentile must be one of {SUPPORTED_PERCENTILES:?}, got {percentile}"
                    )));
                }
                Ok(())
            },
        }
    }

    /// Evaluate against a final snapshot.
    pub fn evaluate(&self, metrics: &AggregateMetrics) -> ThresholdOutcome {
        let (observed, passed) = match self {
            Self::CheckPassRate { min, check } => {
                let rate = match check {
                    Some(name) => metrics.check(name).map_or(0.0, |c| c.pass_rate()),
                    None => metrics.check_pass_rate(),
                };
                (format!("{:.2}%", rate * 100.0), rate >= *min)
            },
            Self::ErrorRate { max } => {
                let rate = metrics.error_rate();
                (format!("{:.2}%", rate * 100.0), rate <= *max)
            },
            Self::Latency { percentile, max } => {
                let limit = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
                match metrics.latency.at_percentile(*percentile) {
                    Some(ms) if metrics.latency.count > 0 => (format!("{ms}ms"), ms <= limit),
                    _ => ("no data".to_string(), false),
                }
            },
        };
        ThresholdOutcome {
            label: self.to_string(),
            observed,
            passed,
        }
    }
}

impl fmt::Display for ThresholdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CheckPassRate {
                min,
                check: Some(name),
            } => write!(f, "checks{{{name}}} rate>={min}"),
            Self::CheckPassRate { min, check: None } => write!(f, "checks rate>={min}"),
            Self::ErrorRate { max } => write!(f, "errors rate<={max}"),
            Self::Latency { percentile, max } => write!(
                f,
                "http_req_duration p({percentile})<={}",
                humantime::format_duration(*max)
            ),
        }
    }
}

/// Result of evaluating one threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdOutcome {
    /// Threshold in display form, e.g. `checks rate>=0.95`.
    pub label: String,
    /// The observed value, formatted.
    pub observed: String,
    pub passed: bool,
}

/// Overall run verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// Process exit code: 0 on pass, 1 on threshold breach.
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Pass => 0,
            Self::Fail => 1,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// Evaluate every threshold. The verdict passes when all pass (or none exist).
pub fn evaluate_all(
    thresholds: &[ThresholdConfig],
    metrics: &AggregateMetrics,
) -> (Vec<ThresholdOutcome>, Verdict) {
    let outcomes: Vec<ThresholdOutcome> = thresholds.iter().map(|t| t.evaluate(metrics)).collect();
    let verdict = if outcomes.iter().all(|o| o.passed) {
        Verdict::Pass
    } else {
        Verdict::Fail
    };
    (outcomes, verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{CheckCounts, LatencySummary};

    fn metrics(passed: u64, failed: u64, errored: u64) -> AggregateMetrics {
        let mut m = AggregateMetrics {
            total_iterations: passed + failed,
            checks_passed: passed,
            checks_failed: failed,
            requests_errored: errored,
            latency: LatencySummary {
                count: passed + failed - errored,
                p95: 420,
                max: 900,
                ..LatencySummary::default()
            },
            ..AggregateMetrics::default()
        };
        m.per_check
            .insert("status was 200".to_string(), CheckCounts { passed, failed });
        m
    }

    fn names() -> HashSet<&'static str> {
        ["status was 200"].into_iter().collect()
    }

    #[test]
    fn test_check_pass_rate_threshold() {
        let t = ThresholdConfig::CheckPassRate {
            min: 0.95,
            check: None,
        };
        assert!(t.evaluate(&metrics(96, 4, 0)).passed);
        assert!(!t.evaluate(&metrics(94, 6, 0)).passed);
        assert_eq!(t.evaluate(&metrics(94, 6, 0)).observed, "94.00%");
    }

    #[test]
    fn test_named_check_pass_rate() {
        let t = ThresholdConfig::CheckPassRate {
            min: 0.95,
            check: Some("status was 200".to_string()),
        };
        let outcome = t.evaluate(&metrics(0, 100, 0));
        assert!(!outcome.passed);
        assert_eq!(outcome.label, "checks{status was 200} rate>=0.95");
    }

    #[test]
    fn test_error_rate_threshold() {
        let t = ThresholdConfig::ErrorRate { max: 0.1 };
        assert!(t.evaluate(&metrics(95, 5, 5)).passed);
        assert!(!t.evaluate(&metrics(50, 50, 50)).passed);
    }

    #[test]
    fn test_latency_threshold() {
        let t = ThresholdConfig::Latency {
            percentile: 95,
            max: Duration::from_millis(500),
        };
        assert!(t.evaluate(&metrics(10, 0, 0)).passed);
        let strict = ThresholdConfig::Latency {
            percentile: 100,
            max: Duration::from_millis(500),
        };
        assert!(!strict.evaluate(&metrics(10, 0, 0)).passed);
    }

    #[test]
    fn test_latency_threshold_without_data_fails() {
        let t = ThresholdConfig::Latency {
            percentile: 95,
            max: Duration::from_secs(1),
        };
        let outcome = t.evaluate(&AggregateMetrics::default());
        assert!(!outcome.passed);
        assert_eq!(outcome.observed, "no data");
    }

    #[test]
    fn test_validation() {
        let n = names();
        assert!(ThresholdConfig::CheckPassRate {
            min: 1.5,
            check: None
        }
        .validate(&n)
        .is_err());
        assert!(ThresholdConfig::CheckPassRate {
            min: 0.9,
            check: Some("nope".to_string())
        }
        .validate(&n)
        .is_err());
        assert!(ThresholdConfig::CheckPassRate {
            min: 0.9,
            check: None
        }
        .validate(&HashSet::new())
        .is_err());
        assert!(ThresholdConfig::Latency {
            percentile: 75,
            max: Duration::from_secs(1)
        }
        .validate(&n)
        .is_err());
        assert!(ThresholdConfig::ErrorRate { max: 0.05 }.validate(&n).is_ok());
    }

    #[test]
    fn test_evaluate_all_verdict() {
        let thresholds = vec![
            ThresholdConfig::CheckPassRate {
                min: 0.95,
                check: None,
            },
            ThresholdConfig::ErrorRate { max: 0.5 },
        ];
        let (outcomes, verdict) = evaluate_all(&thresholds, &metrics(100, 0, 0));
        assert_eq!(outcomes.len(), 2);
        assert_eq!(verdict, Verdict::Pass);
        assert_eq!(verdict.exit_code(), 0);

        let (_, verdict) = evaluate_all(&thresholds, &metrics(0, 100, 0));
        assert_eq!(verdict, Verdict::Fail);
        assert_eq!(verdict.exit_code(), 1);
    }

    #[test]
    fn test_no_thresholds_pass() {
        let (outcomes, verdict) = evaluate_all(&[], &AggregateMetrics::default());
        assert!(outcomes.is_empty());
        assert_eq!(verdict, Verdict::Pass);
    }

    #[test]
    fn test_parse_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            threshold: Vec<ThresholdConfig>,
        }
        let w: Wrapper = toml::from_str(
            r#"
[[threshold]]
type = "check_pass_rate"
min = 0.95

[[threshold]]
type = "latency"
percentile = 99
max = "2s"
"#,
        )
        .unwrap();
        assert_eq!(
            w.threshold[0],
            ThresholdConfig::CheckPassRate {
                min: 0.95,
                check: None
            }
        );
        assert_eq!(
            w.threshold[1],
            ThresholdConfig::Latency {
                percentile: 99,
                max: Duration::from_secs(2)
            }
        );
    }
}
