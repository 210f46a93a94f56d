//! `rampload` CLI subcommands: `run` executes a load test, `init` writes a
//! starter config.

pub mod init;
pub mod run;

/// Directory holding the config and reports, relative to the project root.
pub const CONFIG_DIR: &str = ".rampload";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "loadtest.toml";
