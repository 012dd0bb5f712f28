//! mdlog - segmented write-ahead journal for filesystem metadata
//!
//! Every metadata mutation is recorded in the journal before it is applied.
//! The journal is divided into segments at checkpoint markers, tracks how
//! much of it is submitted, durable and reclaimed, and expires old segments
//! asynchronously without discarding anything replay still needs.
//!
//! # Subsystems
//!
//! - `completion` - status codes, one-shot completions, finisher, gather
//! - `config` - live configuration and retention policy snapshots
//! - `journal` - storage backend: devices, record codec, writer thread
//! - `mdlog` - the journal core
//! - `rank` - owner of the journal's lock, finisher and configuration
//! - `observability` - structured logging and counters
//! - `cli` - the `mdlog` command-line tool

pub mod cli;
pub mod completion;
pub mod config;
pub mod journal;
pub mod mdlog;
pub mod observability;
pub mod rank;
