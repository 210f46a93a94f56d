//! `rampload run` command implementation.

use anyhow::{Context, Result};
use clap::Args;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use rampload::loadtest::config::LoadTestConfig;
use rampload::loadtest::engine::{handle_ctrl_c, RunController};
use rampload::loadtest::profile::RunProfile;
use rampload::loadtest::report::{write_report, LoadTestReport};
use rampload::loadtest::summary::render_summary;
use rampload::loadtest::template::parse_param_assignment;
use rampload::loadtest::threshold::Verdict;

use super::{CONFIG_DIR, CONFIG_FILE};

/// Arguments for `rampload run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to config file (default: auto-discover .rampload/loadtest.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Template parameter as NAME=VALUE; takes precedence over the environment
    #[arg(long = "param", value_parser = parse_param_assignment)]
    pub params: Vec<(String, String)>,

    /// Target URL template (overrides config)
    #[arg(long)]
    pub url: Option<String>,

    /// Pause between iterations, e.g. "500ms" (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub sleep: Option<Duration>,

    /// Per-request timeout, e.g. "10s" (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Drain grace period, e.g. "30s" (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub grace: Option<Duration>,

    /// Disable JSON report output
    #[arg(long)]
    pub no_report: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Execute the `run` command and return the run's verdict.
///
/// Loads config (via explicit path or auto-discovery), applies CLI
/// overrides, resolves template parameters, runs the ramp, and prints the
/// summary. Any error returned here happens before the first virtual user
/// starts, except for a failure to determine the working directory.
pub async fn execute_run(args: RunArgs) -> Result<Verdict> {
    let cwd = std::env::current_dir()?;

    // Step 1: Load config
    let config_file = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `rampload init` to create one.",
                    path.display()
                );
            }
            path.clone()
        },
        None => match discover_config(&cwd) {
            Some(path) => path,
            None => {
                anyhow::bail!(
                    "No loadtest config found.\n\
                     Run `rampload init` to create {CONFIG_DIR}/{CONFIG_FILE},\n\
                     or use `--config path/to/file.toml` to specify one."
                );
            },
        },
    };

    eprintln!("Loading config from: {}", config_file.display());

    let mut config = LoadTestConfig::load(&config_file)
        .with_context(|| format!("Failed to load config '{}'", config_file.display()))?;

    // Step 2: Apply CLI overrides
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid config after CLI overrides")?;

    // Step 3: Resolve template parameters and build the profile
    let profile = RunProfile::resolve(&config, &args.params, |name| std::env::var(name).ok())
        .context("Failed to resolve run profile")?;
    let target = profile.target.to_string();
    info!(url = %target, stages = profile.scheduler.stages().len(), "starting run");

    // Step 4: Run with a two-phase Ctrl+C handler
    let controller = RunController::new(profile);
    let ctrl_c = tokio::spawn(handle_ctrl_c(controller.cancellation_token()));
    let result = controller.run().await;
    ctrl_c.abort();

    // Step 5: k6-style terminal summary
    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&result, controller.profile()));

    // Step 6: JSON report (unless --no-report)
    if !args.no_report {
        let report = LoadTestReport::from_result(&result, &config, &target);
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                eprintln!();
                eprintln!("Warning: Failed to write report: {}", e);
            },
        }
    }

    Ok(result.verdict)
}

/// Apply CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut LoadTestConfig, args: &RunArgs) {
    if let Some(url) = &args.url {
        config.settings.target_url = url.clone();
    }
    if let Some(sleep) = args.sleep {
        config.settings.iteration_sleep = sleep;
    }
    if let Some(timeout) = args.timeout {
        config.settings.request_timeout = timeout;
    }
    if let Some(grace) = args.grace {
        if grace.is_zero() {
            warn!("--grace=0s force-stops every draining worker at the end of the ramp");
        }
        config.settings.grace_period = grace;
    }
}

/// Discover `.rampload/loadtest.toml` by walking parent directories of
/// `start`, the same way `.git` is discovered.
fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
