//! CLI error type
//!
//! Every failure carries a stable code for the JSON error object and a
//! process exit status.

use std::io;

use thiserror::Error;

use crate::completion::Status;
use crate::mdlog::MdLogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Unreadable or malformed `--config` file
    ConfigError,
    /// Journal directory or stdout I/O
    IoError,
    /// `create` on a directory that already holds a journal
    AlreadyInitialized,
    /// Any other command on a directory without one
    NotInitialized,
    /// The journal reported a failure status or error
    JournalFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "MDLOG_CLI_CONFIG_ERROR",
            Self::IoError => "MDLOG_CLI_IO_ERROR",
            Self::AlreadyInitialized => "MDLOG_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "MDLOG_CLI_NOT_INITIALIZED",
            Self::JournalFailed => "MDLOG_CLI_JOURNAL_FAILED",
        }
    }

    /// Process exit status for this code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError => 2,
            Self::AlreadyInitialized | Self::NotInitialized => 3,
            Self::IoError => 4,
            Self::JournalFailed => 5,
        }
    }
}

#[derive(Debug, Error)]
#[error("{}: {}", .code.code(), .message)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn already_initialized() -> Self {
        Self::new(
            CliErrorCode::AlreadyInitialized,
            "directory already holds a journal",
        )
    }

    pub fn not_initialized() -> Self {
        Self::new(
            CliErrorCode::NotInitialized,
            "no journal in directory; run 'mdlog create' first",
        )
    }

    /// `op` completed with a failure status.
    pub fn journal_status(op: &str, status: Status) -> Self {
        Self::new(
            CliErrorCode::JournalFailed,
            format!("{} failed with {}", op, status),
        )
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<MdLogError> for CliError {
    fn from(e: MdLogError) -> Self {
        match e {
            MdLogError::Config(msg) => Self::config_error(msg),
            other => Self::new(
                CliErrorCode::JournalFailed,
                format!("{}: {}", other.code(), other),
            ),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
