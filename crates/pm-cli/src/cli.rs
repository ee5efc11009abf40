//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Reentrancy-aware performance metrics agent.
///
/// Persists whether the agent is enabled and replays recorded host traces
/// through it to produce metric snapshots.
#[derive(Debug, Parser)]
#[command(name = "pm", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show whether the agent is enabled.
    Status,

    /// Enable the agent and persist the flag.
    Enable,

    /// Disable the agent and persist the flag.
    Disable,

    /// Replay a recorded host trace and print the resulting metrics.
    Replay {
        /// Path to a JSON-lines trace file.
        trace: PathBuf,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
