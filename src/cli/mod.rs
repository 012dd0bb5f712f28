//! CLI module for mdlog
//!
//! Provides command-line access to a file-backed journal:
//! - create: Initialize an empty journal
//! - inspect: Replay and report head, positions and segments
//! - append: Write synthetic segments
//! - trim: Expire segments

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{append, create, inspect, run, run_command, trim};
pub use errors::{CliError, CliErrorCode, CliResult};
