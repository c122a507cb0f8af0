//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: run a demo organization under the dispatcher
//! - config: print the resolved configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cadence - aging-priority dispatcher for plan/attend/execute agents
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a demo organization of agents
    Run {
        /// Agents that start with a task
        #[arg(short, long, default_value_t = 4)]
        agents: usize,

        /// Agents that start idle and go waiting until pinged
        #[arg(short, long, default_value_t = 1)]
        idle: usize,

        /// Stop after this many ticks (overrides config)
        #[arg(short = 'n', long)]
        iterations: Option<u64>,

        /// Worker cap (overrides config)
        #[arg(short = 'j', long)]
        concurrency: Option<usize>,

        /// Wall-clock limit in seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,

        /// Restore agent snapshots from this directory and save them back after the run
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,
    },

    /// Print the resolved configuration as YAML
    Config,
}
