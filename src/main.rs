//! rampload: staged virtual-user HTTP load generator.
//!
//! Ramps a pool of virtual users through configured stages against a
//! templated URL, then prints a k6-style summary and exits non-zero when a
//! threshold is breached.

use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// Exit code for configuration and other fatal errors.
const EXIT_FATAL: u8 = 2;

/// Staged virtual-user HTTP load generator
#[derive(Parser)]
#[command(name = "rampload")]
#[command(about = "Ramp virtual users against an HTTP endpoint", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test
    ///
    /// Executes the ramp defined in .rampload/loadtest.toml (or a custom
    /// config path), prints a summary, and writes a JSON report to
    /// .rampload/reports/.
    Run(commands::run::RunArgs),

    /// Generate a starter loadtest config file
    ///
    /// Creates .rampload/loadtest.toml with a 1m ramp-up to 50 VUs, a 3m
    /// hold, and a 1m ramp-down.
    Init {
        /// Target URL template written into the config
        #[arg(long)]
        url: Option<String>,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match execute_command(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        },
    }
}

fn execute_command(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            let verdict = runtime.block_on(commands::run::execute_run(args))?;
            Ok(ExitCode::from(verdict.exit_code()))
        },
        Commands::Init { url, force } => {
            let cwd = std::env::current_dir()?;
            commands::init::execute_init(&cwd, url, force)?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "rampload=debug",
        _ => "rampload=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
