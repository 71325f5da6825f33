// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::default_config_path;

/// Command-line arguments for `htgrun`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "htgrun",
    version,
    about = "Submit a hierarchical task graph stage by stage and drive its master session.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the HTG description (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Master endpoint (`host:port`). Overrides `[client].master`.
    #[arg(long, value_name = "HOST:PORT")]
    pub master: Option<String>,

    /// Validate, print the schedule and job descriptors, submit nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HTGRUN_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Run an in-process per-HTG master on this address until Ctrl-C
    /// instead of submitting anything.
    #[arg(long, value_name = "ADDR", conflicts_with = "dry_run")]
    pub serve_master: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
