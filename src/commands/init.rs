//! `rampload init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

use super::{CONFIG_DIR, CONFIG_FILE};

const DEFAULT_URL: &str = "http://${ALB_DNS}/load?duration=1";

/// Execute the `init` command in `base_dir`.
///
/// Creates `.rampload/loadtest.toml` with a ramp-up/hold/ramp-down profile,
/// a status check, and a pass-rate threshold. Refuses to overwrite an
/// existing file unless `force` is set.
pub fn execute_init(base_dir: &Path, url: Option<String>, force: bool) -> Result<PathBuf> {
    let config_dir = base_dir.join(CONFIG_DIR);
    let config_path = config_dir.join(CONFIG_FILE);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    let content = generate_default_template(url.as_deref().unwrap_or(DEFAULT_URL));

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }
    std::fs::write(&config_path, &content)?;
    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your ramp, checks, and thresholds.");

    Ok(config_path)
}

/// Generate the starter TOML template.
fn generate_default_template(url: &str) -> String {
    format!(
        r#"# Load test configuration for rampload

[settings]
# Target URL. ${{NAME}} placeholders are filled from `--param NAME=VALUE`
# or the environment (including a .env file).
target_url = "{url}"

# Per-request timeout
request_timeout = "60s"

# Pause after each iteration
iteration_sleep = "1s"

# How long draining virtual users may finish their current iteration
grace_period = "30s"

# Ramp up to 50 virtual users, hold, then ramp down.
[[stage]]
duration = "1m"
target = 50

[[stage]]
duration = "3m"
target = 50

[[stage]]
duration = "1m"
target = 0

[[check]]
name = "status was 200"
type = "status_equals"
status = 200

# [[check]]
# name = "fast enough"
# type = "latency_below"
# max = "2s"

[[threshold]]
type = "check_pass_rate"
min = 0.95

# [[threshold]]
# type = "latency"
# percentile = 95
# max = "1500ms"
"#
    )
}
