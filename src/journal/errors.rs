//! Journal backend error types
//!
//! Error codes:
//! - JOURNAL_APPEND_FAILED (FATAL severity)
//! - JOURNAL_CORRUPTION (FATAL severity)
//! - JOURNAL_HEAD_MISSING (ERROR severity)
//! - JOURNAL_IO (ERROR severity)

use std::fmt;
use std::io;

use thiserror::Error;

use crate::completion::Status;

/// Severity levels for journal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, journal continues
    Error,
    /// Journal can no longer guarantee durability
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage backend errors
#[derive(Debug, Error)]
pub enum JournalError {
    /// A batch could not be made durable. Nothing from the batch is applied.
    #[error("append failed at offset {offset}: {source}")]
    AppendFailed {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// A record failed validation.
    #[error("corruption at offset {offset}: {reason}")]
    Corruption { offset: u64, reason: String },

    /// No journal head exists; the journal was never created.
    #[error("journal head missing: {0}")]
    HeadMissing(String),

    /// Any other device failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The backend has been shut down.
    #[error("journal backend is shut down")]
    Shutdown,
}

impl JournalError {
    /// Wrap an I/O error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        JournalError::Io {
            context: context.into(),
            source,
        }
    }

    /// Corruption at a byte offset.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        JournalError::Corruption {
            offset,
            reason: reason.into(),
        }
    }

    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            JournalError::AppendFailed { .. } => "JOURNAL_APPEND_FAILED",
            JournalError::Corruption { .. } => "JOURNAL_CORRUPTION",
            JournalError::HeadMissing(_) => "JOURNAL_HEAD_MISSING",
            JournalError::Io { .. } => "JOURNAL_IO",
            JournalError::Shutdown => "JOURNAL_SHUTDOWN",
        }
    }

    /// Severity of this error.
    pub fn severity(&self) -> Severity {
        match self {
            JournalError::AppendFailed { .. } | JournalError::Corruption { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Whether this error is fatal to the journal's durability guarantee.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Completion status reported to waiters.
    pub fn status(&self) -> Status {
        match self {
            JournalError::Shutdown => Status::ECANCELED,
            JournalError::HeadMissing(_) => Status::EINVAL,
            _ => Status::EIO,
        }
    }
}

/// Result type for journal backend operations
pub type JournalResult<T> = Result<T, JournalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_failed_is_fatal() {
        let err = JournalError::AppendFailed {
            offset: 10,
            source: io::Error::new(io::ErrorKind::Other, "disk error"),
        };
        assert!(err.is_fatal());
        assert_eq!(err.code(), "JOURNAL_APPEND_FAILED");
        assert_eq!(err.status(), Status::EIO);
    }

    #[test]
    fn test_head_missing_is_not_fatal() {
        let err = JournalError::HeadMissing("no head".to_string());
        assert!(!err.is_fatal());
        assert_eq!(err.status(), Status::EINVAL);
    }

    #[test]
    fn test_display_contains_offset() {
        let err = JournalError::corruption_at_offset(42, "checksum mismatch");
        let display = err.to_string();
        assert!(display.contains("42"));
        assert!(display.contains("checksum mismatch"));
    }
}
