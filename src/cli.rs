// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `mailsweep`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mailsweep",
    version,
    about = "Policy-driven cleanup automation for a mailbox index.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Mailsweep.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Mailsweep.toml")]
    pub config: String,

    /// JSON mailbox snapshot to run against. Written back on exit.
    #[arg(long, value_name = "PATH")]
    pub records: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MAILSWEEP_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print config and policies, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run one scheduler tick and one signal sample, then shut down.
    #[arg(long, conflicts_with = "trigger")]
    pub once: bool,

    /// Enqueue and process one manual cleanup for this policy id.
    #[arg(long, value_name = "POLICY")]
    pub trigger: Option<String>,

    /// With `--trigger`: compute would-be results without touching records.
    #[arg(long, requires = "trigger")]
    pub preview: bool,

    /// With `--trigger`: confirm a policy that requires confirmation.
    #[arg(long, requires = "trigger")]
    pub confirm: bool,

    /// With `--trigger`: cap this run below the policy's own limit.
    #[arg(long, value_name = "N", requires = "trigger")]
    pub max_emails: Option<usize>,

    /// With `--trigger`: records per backend call.
    #[arg(long, value_name = "N", requires = "trigger")]
    pub batch_size: Option<usize>,
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
