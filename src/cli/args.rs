//! CLI argument definitions using clap
//!
//! Commands:
//! - mdlog create --dir <path>
//! - mdlog inspect --dir <path>
//! - mdlog append --dir <path> [--segments N] [--events M] [--major-every K]
//! - mdlog trim --dir <path> [--all]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mdlog - segmented metadata journal tool
#[derive(Parser, Debug)]
#[command(name = "mdlog")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// JSON object of configuration options applied before the command runs
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize an empty journal
    Create {
        /// Journal directory
        #[arg(long)]
        dir: PathBuf,
    },

    /// Replay a journal and print its head, positions and segments
    Inspect {
        /// Journal directory
        #[arg(long)]
        dir: PathBuf,
    },

    /// Append synthetic segments and wait until they are durable
    Append {
        /// Journal directory
        #[arg(long)]
        dir: PathBuf,

        /// Number of segments to write
        #[arg(long, default_value_t = 1)]
        segments: u64,

        /// Events per segment, including the boundary event
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
        events: u64,

        /// Make every K-th segment a major segment (the first always is)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        major_every: u64,

        /// Payload bytes per regular event
        #[arg(long, default_value_t = 64)]
        payload_size: usize,
    },

    /// Replay a journal and expire segments
    Trim {
        /// Journal directory
        #[arg(long)]
        dir: PathBuf,

        /// Expire every eligible segment instead of only those over the limits
        #[arg(long)]
        all: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
