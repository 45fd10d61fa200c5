//! Command-line interface using clap derive macros

pub mod args;
pub mod commands;
pub mod exit_code;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use args::{CompletionArgs, ConfigArgs, DialArgs, VersionArgs};

/// Reverse-tunnel proxy routing tools
#[derive(Parser, Debug)]
#[command(name = "revtunnel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, global = true, env = "REVTUNNEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Format of the log lines written to stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dial a target through a peer proxy and bridge it to stdin/stdout
    Dial(DialArgs),

    /// Show or validate configuration
    Config(ConfigArgs),

    /// Show version information
    Version(VersionArgs),

    /// Generate shell completions
    Completion(CompletionArgs),
}
