//! CLI command implementations
//!
//! Each command builds a rank over a file-backed journal directory, runs to
//! completion and returns a JSON report. The rank is shut down when the
//! command returns.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::completion::Status;
use crate::config::ConfigStore;
use crate::journal::{file_backend, FileDevice};
use crate::mdlog::{LogEvent, MdLog};
use crate::rank::{Rank, DEFAULT_WAIT};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Parse arguments, run the command and print its report.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match run_command(cli) {
        Ok(report) => write_response(report),
        Err(e) => {
            let _ = write_error(e.code_str(), e.message());
            Err(e)
        }
    }
}

/// Run a parsed command.
pub fn run_command(cli: Cli) -> CliResult<Value> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Create { dir } => create(&dir, config),
        Command::Inspect { dir } => inspect(&dir, config),
        Command::Append {
            dir,
            segments,
            events,
            major_every,
            payload_size,
        } => append(&dir, config, segments, events, major_every, payload_size),
        Command::Trim { dir, all } => trim(&dir, config, all),
    }
}

fn load_config(path: Option<&Path>) -> CliResult<Arc<ConfigStore>> {
    let config = ConfigStore::new();
    if let Some(path) = path {
        config.load_json_file(path)?;
    }
    Ok(Arc::new(config))
}

fn is_initialized(dir: &Path) -> bool {
    dir.join(FileDevice::HEAD_FILE).exists()
}

fn build_rank(dir: &Path, config: Arc<ConfigStore>) -> CliResult<Rank> {
    let backend = file_backend(dir).map_err(|e| CliError::io_error(e.to_string()))?;
    Ok(Rank::builder(backend).config(config).build())
}

fn check(op: &str, status: Status) -> CliResult<()> {
    if status.is_ok() {
        Ok(())
    } else {
        Err(CliError::journal_status(op, status))
    }
}

/// Build a rank and replay the journal in `dir`.
fn open_rank(dir: &Path, config: Arc<ConfigStore>) -> CliResult<Rank> {
    if !is_initialized(dir) {
        return Err(CliError::not_initialized());
    }
    let rank = build_rank(dir, config)?;
    check("open", rank.open_and_wait(DEFAULT_WAIT))?;
    Ok(rank)
}

fn summary(log: &MdLog) -> Value {
    json!({
        "state": log.state(),
        "positions": log.positions(),
        "num_segments": log.get_num_segments(),
        "num_events": log.get_num_events(),
        "metrics": log.metrics().snapshot(),
    })
}

/// `mdlog create`
pub fn create(dir: &Path, config: Arc<ConfigStore>) -> CliResult<Value> {
    if is_initialized(dir) {
        return Err(CliError::already_initialized());
    }
    let rank = build_rank(dir, config)?;
    check("create", rank.create_and_wait(DEFAULT_WAIT))?;

    let log = rank.lock();
    let mut report = summary(&log);
    report["head"] = serde_json::to_value(log.head())?;
    Ok(report)
}

/// `mdlog inspect`
pub fn inspect(dir: &Path, config: Arc<ConfigStore>) -> CliResult<Value> {
    let rank = open_rank(dir, config)?;

    let log = rank.lock();
    let mut report = summary(&log);
    report["head"] = serde_json::to_value(log.head())?;
    report["replay"] = serde_json::to_value(log.replay_summary())?;
    report["policy"] = serde_json::to_value(&*log.policy())?;
    report["segments"] = serde_json::to_value(log.segment_infos())?;
    Ok(report)
}

/// `mdlog append`
///
/// Segment `i` is major when `i % major_every == 0`, so the first segment
/// always is.
pub fn append(
    dir: &Path,
    config: Arc<ConfigStore>,
    segments: u64,
    events: u64,
    major_every: u64,
    payload_size: usize,
) -> CliResult<Value> {
    let rank = open_rank(dir, config)?;

    let mut dropped = 0u64;
    {
        let mut log = rank.lock();
        for i in 0..segments {
            let boundary = if i % major_every == 0 {
                LogEvent::major(format!("segment-{}", i))
            } else {
                LogEvent::minor(format!("segment-{}", i))
            };
            if log.submit_entry(boundary)?.is_dropped() {
                dropped += 1;
            }
            for _ in 1..events {
                if log.submit_entry(LogEvent::noop(payload_size))?.is_dropped() {
                    dropped += 1;
                }
            }
        }
    }
    check("flush", rank.flush_and_wait(DEFAULT_WAIT))?;

    let log = rank.lock();
    let mut report = summary(&log);
    report["dropped"] = json!(dropped);
    Ok(report)
}

/// `mdlog trim`
pub fn trim(dir: &Path, config: Arc<ConfigStore>, all: bool) -> CliResult<Value> {
    let rank = open_rank(dir, config)?;

    let started = {
        let mut log = rank.lock();
        if all {
            log.trim_all()
        } else {
            log.trim()
        }
    };
    check("expire", rank.await_expirations(DEFAULT_WAIT))?;
    rank.finisher().wait_for_empty();

    let log = rank.lock();
    let mut report = summary(&log);
    report["expired"] = json!(started);
    report["zombies"] = serde_json::to_value(log.zombie_segments())?;
    Ok(report)
}
