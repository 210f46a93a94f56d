//! TOML-based load test configuration.
//!
//! Defines typed structs for parsing a ramp profile, request settings,
//! checks, and thresholds from a TOML config file. Parsing is eager: a
//! config either validates completely or fails with a [`LoadTestError`]
//! before any virtual user exists.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! target_url = "http://${ALB_DNS}/load?duration=1"
//! request_timeout = "10s"
//! iteration_sleep = "1s"
//!
//! [[stage]]
//! duration = "1m"
//! target = 50
//!
//! [[stage]]
//! duration = "3m"
//! target = 50
//!
//! [[stage]]
//! duration = "1m"
//! target = 0
//!
//! [[check]]
//! name = "status was 200"
//! type = "status_equals"
//! status = 200
//!
//! [[threshold]]
//! type = "check_pass_rate"
//! min = 0.95
//! ```
//!
//! Durations use human-readable strings (`"500ms"`, `"30s"`, `"1m30s"`).
//! `${NAME}` placeholders in `target_url` are resolved from `--param`
//! flags or the environment when the run profile is built.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::loadtest::check::CheckConfig;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::threshold::ThresholdConfig;

/// Serde adapter for human-readable duration strings.
pub mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// A load-shaping stage: ramp linearly to `target` VUs over `duration`.
///
/// Stages are `[[stage]]` blocks; their order is the ramp order. A stage
/// whose `target` equals the previous stage's target is a plateau.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// How long the stage lasts.
    #[serde(with = "duration_str")]
    pub duration: Duration,
    /// Number of virtual users at the end of this stage.
    pub target: u32,
}

impl Stage {
    /// Convenience constructor.
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

/// Top-level load test configuration parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoadTestConfig {
    /// Request and lifecycle settings.
    pub settings: Settings,
    /// Ramp stages.
    ///
    /// The field name is `stage` (not `stages`) because TOML `[[stage]]`
    /// array-of-tables syntax creates a key called `stage`.
    #[serde(default)]
    pub stage: Vec<Stage>,
    /// Named response checks.
    #[serde(default)]
    pub check: Vec<CheckConfig>,
    /// Post-run pass/fail criteria.
    #[serde(default)]
    pub threshold: Vec<ThresholdConfig>,
}

/// Request and run lifecycle settings.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Target URL template, may contain `${NAME}` placeholders.
    pub target_url: String,
    /// Per-request timeout.
    #[serde(with = "duration_str", default = "default_request_timeout")]
    pub request_timeout: Duration,
    /// Pause after each iteration before the next request.
    #[serde(with = "duration_str", default = "default_iteration_sleep")]
    pub iteration_sleep: Duration,
    /// How long draining workers get to finish before they are force-stopped.
    #[serde(with = "duration_str", default = "default_grace_period")]
    pub grace_period: Duration,
    /// Interval between pool reconciliation ticks.
    #[serde(with = "duration_str", default = "default_tick_interval")]
    pub tick_interval: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_iteration_sleep() -> Duration {
    Duration::from_secs(1)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_tick_interval() -> Duration {
    Duration::from_secs(1)
}

impl Settings {
    /// Settings for `target_url` with every other field at its default.
    pub fn with_target(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            request_timeout: default_request_timeout(),
            iteration_sleep: default_iteration_sleep(),
            grace_period: default_grace_period(),
            tick_interval: default_tick_interval(),
        }
    }
}

/// Sum of stage durations, or `None` on overflow.
pub(crate) fn checked_total(stages: &[Stage]) -> Option<Duration> {
    stages
        .iter()
        .try_fold(Duration::ZERO, |acc, s| acc.checked_add(s.duration))
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Returns the sum of all stage durations, saturating at `Duration::MAX`.
    pub fn total_stage_duration(&self) -> Duration {
        checked_total(&self.stage).unwrap_or(Duration::MAX)
    }

    /// Returns the largest stage target (0 when there are no stages).
    pub fn max_target(&self) -> u32 {
        self.stage.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - `target_url` is non-empty
    /// - At least one `[[stage]]` is defined and none has a zero duration
    /// - The stage durations sum without overflow
    /// - `request_timeout` and `tick_interval` are positive, and the tick
    ///   interval fits inside the ramp
    /// - Check names are non-empty and unique
    /// - Thresholds are in range and only reference declared checks
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.settings.target_url.trim().is_empty() {
            return Err(LoadTestError::validation("settings.target_url must not be empty"));
        }

        if self.stage.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[stage]] block",
            ));
        }
        for (i, stage) in self.stage.iter().enumerate() {
            if stage.duration.is_zero() {
                return Err(LoadTestError::validation(format!(
                    "Stage {} has a zero duration; each stage must have a positive duration",
                    i + 1
                )));
            }
        }

        if self.settings.request_timeout.is_zero() {
            return Err(LoadTestError::validation(
                "settings.request_timeout must be greater than zero",
            ));
        }
        if self.settings.tick_interval.is_zero() {
            return Err(LoadTestError::validation(
                "settings.tick_interval must be greater than zero",
            ));
        }

        let total = checked_total(&self.stage)
            .ok_or_else(|| LoadTestError::validation("total stage duration overflows"))?;
        if self.settings.tick_interval > total {
            return Err(LoadTestError::validation(format!(
                "settings.tick_interval ({}) exceeds the total stage duration ({})",
                humantime::format_duration(self.settings.tick_interval),
                humantime::format_duration(total)
            )));
        }

        let mut names = HashSet::new();
        for check in &self.check {
            if check.name.trim().is_empty() {
                return Err(LoadTestError::validation("Check names must not be empty"));
            }
            if !names.insert(check.name.as_str()) {
                return Err(LoadTestError::validation(format!(
                    "Duplicate check name '{}'",
                    check.name
                )));
            }
        }

        for threshold in &self.threshold {
            threshold.validate(&names)?;
        }

        Ok(())
    }
}
