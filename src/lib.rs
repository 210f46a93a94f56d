//! # rampload
//!
//! Staged virtual-user HTTP load generator. Describe a ramp profile, the
//! request to send, response checks, and pass/fail thresholds in TOML; the
//! engine scales a pool of concurrent virtual users to follow the ramp and
//! reports aggregate results when it completes.
//!
//! ```rust,no_run
//! use rampload::loadtest::config::LoadTestConfig;
//! use rampload::loadtest::engine::RunController;
//! use rampload::loadtest::profile::RunProfile;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoadTestConfig::load(std::path::Path::new(".rampload/loadtest.toml"))?;
//! let profile = RunProfile::resolve(&config, &[], |name| std::env::var(name).ok())?;
//! let result = RunController::new(profile).run().await;
//! println!("verdict: {}", result.verdict);
//! # Ok(())
//! # }
//! ```

pub mod loadtest;
