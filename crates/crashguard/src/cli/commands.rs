//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Show the last N crash reports
    #[arg(short = 'n', long, default_value = "10")]
    pub last: usize,

    /// Include stack traces in plain output
    #[arg(short, long)]
    pub stack: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Wipe command arguments.
#[derive(Debug, Args)]
pub struct WipeCommand {
    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,
}

/// Simulate command arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Panic message to raise
    #[arg(default_value = "simulated panic")]
    pub message: String,

    /// Raise the panic on a guarded background thread
    #[arg(long)]
    pub background: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        path: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}
