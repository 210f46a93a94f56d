//! JSON report serialization for run results.
//!
//! Produces a schema-versioned JSON report containing check outcomes,
//! latency percentiles, error classification, threshold outcomes, and the
//! full resolved config for reproducibility. Designed for CI/CD pipeline
//! consumption.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::RunResult;
use crate::loadtest::metrics::{CheckCounts, LatencySummary};
use crate::loadtest::threshold::{ThresholdOutcome, Verdict};

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Target URL with every placeholder resolved.
    pub target_url: String,
    /// Actual run duration in seconds.
    pub duration_secs: f64,
    pub verdict: Verdict,
    /// The config as loaded, after CLI overrides.
    pub config: LoadTestConfig,
    pub metrics: ReportMetrics,
    /// Per-check totals keyed by check name.
    pub checks: BTreeMap<String, CheckCounts>,
    /// Errored iterations keyed by category.
    pub errors: BTreeMap<String, u64>,
    /// Responses keyed by status code.
    pub status_codes: BTreeMap<String, u64>,
    pub thresholds: Vec<ThresholdOutcome>,
}

/// Aggregate metrics in the report.
#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    pub iterations: u64,
    pub iterations_per_sec: f64,
    pub checks_passed: u64,
    pub checks_failed: u64,
    /// Fraction of check evaluations that passed (0.0..=1.0).
    pub check_pass_rate: f64,
    pub requests_errored: u64,
    /// Fraction of iterations that errored (0.0..=1.0).
    pub error_rate: f64,
    pub max_vus: u32,
    /// Workers aborted at grace expiry.
    pub force_stopped: u32,
    pub cancelled: bool,
    /// Response latency in milliseconds.
    pub latency_ms: LatencySummary,
}

impl LoadTestReport {
    /// Build a report from a run result, its config, and the resolved target URL.
    pub fn from_result(result: &RunResult, config: &LoadTestConfig, target_url: &str) -> Self {
        let m = &result.metrics;
        let elapsed_secs = result.elapsed.as_secs_f64();
        let iterations_per_sec = if elapsed_secs > 0.0 {
            m.total_iterations as f64 / elapsed_secs
        } else {
            0.0
        };

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            target_url: target_url.to_string(),
            duration_secs: elapsed_secs,
            verdict: result.verdict,
            config: config.clone(),
            metrics: ReportMetrics {
                iterations: m.total_iterations,
                iterations_per_sec,
                checks_passed: m.checks_passed,
                checks_failed: m.checks_failed,
                check_pass_rate: m.check_pass_rate(),
                requests_errored: m.requests_errored,
                error_rate: m.error_rate(),
                max_vus: result.max_vus,
                force_stopped: result.force_stopped,
                cancelled: result.cancelled,
                latency_ms: m.latency,
            },
            checks: m.per_check.clone(),
            errors: m.error_categories.clone(),
            status_codes: m
                .status_codes
                .iter()
                .map(|(status, count)| (status.to_string(), *count))
                .collect(),
            thresholds: result.thresholds.clone(),
        }
    }
}

/// Write a JSON report file to the `.rampload/reports/` directory.
///
/// Creates the reports directory if it does not exist. The filename is
/// timestamped: `loadtest-YYYY-MM-DDTHH-MM-SS.json` (hyphens, not colons,
/// for Windows compatibility).
///
/// Returns the path to the written report file.
pub fn write_report(report: &LoadTestReport, base_dir: &Path) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(".rampload").join("reports");
    if !reports_dir.exists() {
        std::fs::create_dir_all(&reports_dir)?;
    }

    let report_path = reports_dir.join(report_filename(&chrono::Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// Report filename for a given timestamp.
pub fn report_filename(timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}
