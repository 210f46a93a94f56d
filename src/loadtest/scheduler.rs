//! Stage scheduler: maps elapsed run time to a target VU count.
//!
//! The ramp is piecewise linear. Each stage interpolates from the previous
//! stage's target (0 before the first stage) to its own target, reaching it
//! exactly at the stage's end boundary.

use std::time::Duration;

use crate::loadtest::config::{checked_total, Stage};
use crate::loadtest::error::LoadTestError;

/// Computes target concurrency from an immutable stage list.
#[derive(Debug, Clone)]
pub struct StageScheduler {
    stages: Vec<Stage>,
    total: Duration,
}

impl StageScheduler {
    /// Build a scheduler, rejecting an empty list, any zero-duration stage,
    /// or stages whose total duration overflows.
    pub fn new(stages: Vec<Stage>) -> Result<Self, LoadTestError> {
        if stages.is_empty() {
            return Err(LoadTestError::validation(
                "At least one stage is required to build a ramp",
            ));
        }
        if let Some(idx) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(LoadTestError::validation(format!(
                "Stage {} has a zero duration; interpolation is undefined",
                idx + 1
            )));
        }
        let total = checked_total(&stages)
            .ok_or_else(|| LoadTestError::validation("total stage duration overflows"))?;
        Ok(Self { stages, total })
    }

    /// The stage list in ramp order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Sum of all stage durations; the run's final boundary.
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Largest target across all stages.
    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Target VU count at `elapsed`.
    ///
    /// Returns the last stage's target at exactly the final boundary and 0
    /// strictly after it. Fractional values round to the nearest integer.
    pub fn target_concurrency(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut from = 0u32;
        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let fraction =
                    (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                return interpolate(from, stage.target, fraction);
            }
            from = stage.target;
            stage_start = stage_end;
        }
        if elapsed == self.total {
            from
        } else {
            0
        }
    }

    /// Zero-based index of the stage active at `elapsed`, or `None` once the
    /// final boundary has been passed.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        let mut boundary = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            boundary += stage.duration;
            if elapsed < boundary {
                return Some(idx);
            }
        }
        (elapsed == self.total).then(|| self.stages.len() - 1)
    }

    /// Whether `elapsed` has reached the final boundary.
    pub fn is_complete(&self, elapsed: Duration) -> bool {
        elapsed >= self.total
    }

    /// Human-readable `stage N/M` label for `elapsed`.
    pub fn stage_label(&self, elapsed: Duration) -> String {
        match self.stage_index_at(elapsed) {
            Some(idx) => format!("stage {}/{}", idx + 1, self.stages.len()),
            None => "complete".to_string(),
        }
    }
}

fn interpolate(from: u32, to: u32, fraction: f64) -> u32 {
    let fraction = fraction.clamp(0.0, 1.0);
    let value = f64::from(from) + (f64::from(to) - f64::from(from)) * fraction;
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}
