//! k6-style terminal summary renderer for run results.
//!
//! [`render_summary`] is a pure function: it takes a [`RunResult`] and the
//! [`RunProfile`] it came from and returns a formatted [`String`]. Color is
//! applied via the `colored` crate, which respects the global override set
//! by `colored::control::set_override(false)` when `--no-color` is active or
//! stdout is piped.
//!
//! # Layout
//!
//! ```text
//!           /\      |  rampload
//!          /  \     |
//!     /\  /    \    |  target:    http://lb.internal/load?duration=1
//!    /  \/      \   |  stages:    3 (max 50 VUs)
//!   /    \       \  |  duration:  5m
//!  /      \       \ |  sleep:     1s
//!
//!   ✓ status was 200
//!
//!   checks..................................: 100.00% ✓ 13500 ✗ 0
//!   http_req_duration.......................: avg=1.02s min=1.00s med=1.00s max=1.30s p(90)=1.10s p(95)=1.20s p(99)=1.25s
//!   http_req_failed.........................: 0.00% (0 of 13500)
//!   iterations..............................: 13500 45.0/s
//!   vus_max.................................: 50
//! ```

use std::time::Duration;

use colored::Colorize;

use crate::loadtest::engine::RunResult;
use crate::loadtest::metrics::AggregateMetrics;
use crate::loadtest::profile::RunProfile;
use crate::loadtest::threshold::Verdict;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Render the end-of-run summary.
pub fn render_summary(result: &RunResult, profile: &RunProfile) -> String {
    let m = &result.metrics;
    let mut lines = vec![render_header(profile)];

    if !m.per_check.is_empty() {
        for (name, counts) in &m.per_check {
            let line = if counts.failed == 0 {
                format!("  {} {name}", "\u{2713}".green())
            } else {
                format!(
                    "  {} {name}\n    \u{21b3}  {:.0}% - \u{2713} {} / \u{2717} {}",
                    "\u{2717}".red(),
                    counts.pass_rate() * 100.0,
                    counts.passed,
                    counts.failed
                )
            };
            lines.push(line);
        }
        lines.push(String::new());

        let rate = m.check_pass_rate() * 100.0;
        let rate_str = format!("{rate:.2}%");
        let rate_colored = if m.checks_failed == 0 {
            rate_str.green().to_string()
        } else {
            rate_str.red().to_string()
        };
        lines.push(format_metric_row(
            "checks",
            &format!(
                "{rate_colored} \u{2713} {} \u{2717} {}",
                m.checks_passed, m.checks_failed
            ),
            PAD_WIDTH,
        ));
    }

    lines.push(format_metric_row(
        "http_req_duration",
        &render_latency(m),
        PAD_WIDTH,
    ));

    let failed_pct = m.error_rate() * 100.0;
    let failed_str = format!(
        "{failed_pct:.2}% ({} of {})",
        m.requests_errored, m.total_iterations
    );
    let failed_colored = if failed_pct > 5.0 {
        failed_str.red().to_string()
    } else if failed_pct > 1.0 {
        failed_str.yellow().to_string()
    } else {
        failed_str.green().to_string()
    };
    lines.push(format_metric_row("http_req_failed", &failed_colored, PAD_WIDTH));

    let elapsed_secs = result.elapsed.as_secs_f64();
    let throughput = if elapsed_secs > 0.0 {
        m.total_iterations as f64 / elapsed_secs
    } else {
        0.0
    };
    lines.push(format_metric_row(
        "iterations",
        &format!("{} {throughput:.1}/s", m.total_iterations),
        PAD_WIDTH,
    ));
    lines.push(format_metric_row("vus_max", &result.max_vus.to_string(), PAD_WIDTH));
    lines.push(format_metric_row(
        "elapsed",
        &format_ms(result.elapsed),
        PAD_WIDTH,
    ));

    if result.force_stopped > 0 {
        lines.push(format_metric_row(
            "vus_force_stopped",
            &format!(
                "{} (in-flight iterations discarded)",
                result.force_stopped
            )
            .yellow()
            .to_string(),
            PAD_WIDTH,
        ));
    }
    if result.cancelled {
        lines.push(format_metric_row(
            "interrupted",
            &"ramp cut short by Ctrl+C".yellow().to_string(),
            PAD_WIDTH,
        ));
    }

    if !m.status_codes.is_empty() {
        lines.push(String::new());
        lines.push("  status codes:".to_string());
        for (status, count) in &m.status_codes {
            let count_str = if (200..400).contains(status) {
                count.to_string()
            } else {
                count.to_string().red().to_string()
            };
            lines.push(format_metric_row(&format!("    {status}"), &count_str, PAD_WIDTH));
        }
    }

    if !m.error_categories.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = m.error_categories.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1));
        for (category, count) in categories {
            lines.push(format_metric_row(
                &format!("    {category}"),
                &count.to_string().red().to_string(),
                PAD_WIDTH,
            ));
        }
    }

    if !result.thresholds.is_empty() {
        lines.push(String::new());
        lines.push("  thresholds:".to_string());
        for outcome in &result.thresholds {
            let mark = if outcome.passed {
                "\u{2713}".green()
            } else {
                "\u{2717}".red()
            };
            lines.push(format!("    {mark} {} (observed {})", outcome.label, outcome.observed));
        }
    }

    lines.push(String::new());
    let verdict = match result.verdict {
        Verdict::Pass => result.verdict.to_string().green().bold(),
        Verdict::Fail => result.verdict.to_string().red().bold(),
    };
    lines.push(format!("  verdict: {verdict}"));

    lines.join("\n")
}

fn render_latency(m: &AggregateMetrics) -> String {
    let l = &m.latency;
    if l.count == 0 {
        return "no responses".to_string();
    }
    let value = format!(
        "avg={} min={} med={} max={} p(90)={} p(95)={} p(99)={}",
        format_ms_f(l.mean),
        format_ms(Duration::from_millis(l.min)),
        format_ms(Duration::from_millis(l.p50)),
        format_ms(Duration::from_millis(l.max)),
        format_ms(Duration::from_millis(l.p90)),
        format_ms(Duration::from_millis(l.p95)),
        format_ms(Duration::from_millis(l.p99)),
    );
    if l.p99 < 1000 {
        value.green().to_string()
    } else {
        value.yellow().to_string()
    }
}

fn format_ms(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 1000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{ms}ms")
    }
}

fn format_ms_f(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{ms:.1}ms")
    }
}

/// Render the ASCII art header with run configuration details.
fn render_header(profile: &RunProfile) -> String {
    let scheduler = &profile.scheduler;
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  target:    {}
   /  \/      \   |  stages:    {} (max {} VUs)
  /    \       \  |  duration:  {}
 /      \       \ |  sleep:     {}
"#,
        "rampload".bold(),
        profile.target,
        scheduler.stages().len(),
        scheduler.max_target(),
        humantime::format_duration(scheduler.total_duration()),
        humantime::format_duration(profile.request.iteration_sleep),
    )
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}
