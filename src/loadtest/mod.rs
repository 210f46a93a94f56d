//! Staged virtual-user HTTP load generation.
//!
//! A run ramps a pool of virtual users through a sequence of stages, each
//! user looping on a templated GET request, and finishes with a check and
//! latency summary plus a pass/fail verdict from configured thresholds.

pub mod check;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod report;
pub mod scheduler;
pub mod summary;
pub mod template;
pub mod threshold;
pub mod vu;
