//! Command-line interface for crashguard.
//!
//! This module provides the CLI structure for the `crashlog` binary, which
//! inspects and maintains a crash report file.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, OutputFormat, ShowCommand, SimulateCommand, WipeCommand};

use crate::logging::Verbosity;

/// crashlog - Inspect recorded panics
///
/// Reads, clears and exercises the crash report file written by crashguard
/// panic handlers.
#[derive(Debug, Parser)]
#[command(name = "crashlog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Crash report file (overrides configuration)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the most recent crash reports
    #[command(alias = "tail")]
    Show(ShowCommand),

    /// Count recorded crash reports
    Count,

    /// Remove all crash reports
    Wipe(WipeCommand),

    /// Raise a panic under a guard and record it
    Simulate(SimulateCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
