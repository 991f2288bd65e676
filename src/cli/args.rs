//! CLI argument definitions using clap
//!
//! Commands:
//! - lra-coordinator run --config <path>
//! - lra-coordinator recover --config <path>
//! - lra-coordinator inspect --config <path> [--kind <kind>] [--json]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::store::RecordKind;

/// Crash-safe coordinator for saga-style Long Running Actions
#[derive(Parser, Debug)]
#[command(name = "lra-coordinator")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Boot the coordinator, sweep periodically, shut down on Ctrl-C
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./coordinator.json")]
        config: PathBuf,
    },

    /// Run one recovery sweep and print its report
    Recover {
        /// Path to configuration file
        #[arg(long, default_value = "./coordinator.json")]
        config: PathBuf,
    },

    /// Print the persisted LRA records
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./coordinator.json")]
        config: PathBuf,

        /// Only this record kind (lra-active or lra-failed)
        #[arg(long)]
        kind: Option<RecordKind>,

        /// Print the versioned JSON snapshot instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
