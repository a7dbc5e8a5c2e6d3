// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `devgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devgraph",
    version,
    about = "Build, deploy and test project actions in dependency order, and keep them up to date while you edit.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the project file (TOML).
    ///
    /// Default: `Devgraph.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Devgraph.toml")]
    pub config: String,

    /// Keep running and re-plan when sources or config change.
    #[arg(long, short)]
    pub watch: bool,

    /// Override `project.concurrency`.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the action graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Deploy actions to deploy (default: all).
    #[arg(value_name = "DEPLOY")]
    pub deploy: Vec<String>,

    /// Don't run any tests.
    #[arg(long)]
    pub skip_tests: bool,

    /// Only run tests whose name matches one of these globs.
    #[arg(long, value_name = "GLOB", num_args = 1..)]
    pub test_names: Vec<String>,

    /// Skip status checks; execute every initial task.
    #[arg(long)]
    pub force: bool,

    /// Force the builds the initial tasks depend on.
    #[arg(long)]
    pub force_build: bool,
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
