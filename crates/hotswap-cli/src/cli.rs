//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// hotswap - keep plugins in step with a directory of modules
#[derive(Parser)]
#[command(name = "hotswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "HOTSWAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load every module in a directory and reload them as they change
    Watch {
        /// Plugin directory (overrides the configuration file)
        dir: Option<PathBuf>,

        /// Enable every plugin after the initial load
        #[arg(long)]
        enable: bool,
    },

    /// Load every module once and report what was found
    Scan {
        /// Plugin directory (overrides the configuration file)
        dir: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}
