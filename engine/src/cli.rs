//! CLI interface for Waypoint
//!
//! Command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Waypoint
///
/// Turns a request into a sequence of file operations on your codebase,
/// asking before anything is changed.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Workspace directory (overrides core.workspace)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Model provider (overrides llm.default_provider)
    #[arg(long, global = true, value_name = "NAME")]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one request to completion
    Run {
        /// What to do
        request: String,

        /// Approve every proposed action without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Read requests line by line, one episode each
    Repl,

    /// List the available action kinds
    Actions,

    /// List external tool clients and their tools
    Tools,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,
}
