//! Journal core error types
//!
//! Error codes:
//! - MDLOG_INVALID_STATE (ERROR severity)
//! - MDLOG_NO_OPEN_SEGMENT (ERROR severity)
//! - MDLOG_EVENT_TOO_LARGE (ERROR severity)
//! - MDLOG_WRITE_FAILED (FATAL severity)
//! - MDLOG_CONFIG (ERROR severity)
//! - Backend errors keep their JOURNAL_* code and severity

use std::fmt;

use thiserror::Error;

use crate::completion::Status;
use crate::journal::{self, JournalError};

/// Severity levels for journal core errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, journal continues
    Error,
    /// Journal is read-only until restarted
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

/// Journal core errors
#[derive(Debug, Error)]
pub enum MdLogError {
    /// Operation not valid in the journal's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A regular event was submitted before any boundary event.
    #[error("no open segment: submit a boundary event first")]
    NoOpenSegment,

    /// Event exceeds `mds_log_event_large_threshold` and policy rejects it.
    #[error("event of {size} bytes exceeds large-event threshold of {threshold} bytes")]
    EventTooLarge { size: u64, threshold: u64 },

    /// An earlier backend write failed; the journal accepts no more events.
    #[error("journal write failed with {0}; journal is read-only")]
    WriteFailed(Status),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend failure.
    #[error(transparent)]
    Backend(#[from] JournalError),
}

impl MdLogError {
    /// Invalid state with a message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        MdLogError::InvalidState(msg.into())
    }

    /// Stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            MdLogError::InvalidState(_) => "MDLOG_INVALID_STATE",
            MdLogError::NoOpenSegment => "MDLOG_NO_OPEN_SEGMENT",
            MdLogError::EventTooLarge { .. } => "MDLOG_EVENT_TOO_LARGE",
            MdLogError::WriteFailed(_) => "MDLOG_WRITE_FAILED",
            MdLogError::Config(_) => "MDLOG_CONFIG",
            MdLogError::Backend(e) => e.code(),
        }
    }

    /// Severity of this error.
    pub fn severity(&self) -> Severity {
        match self {
            MdLogError::WriteFailed(_) => Severity::Fatal,
            MdLogError::Backend(e) => match e.severity() {
                journal::Severity::Fatal => Severity::Fatal,
                journal::Severity::Error => Severity::Error,
            },
            _ => Severity::Error,
        }
    }

    /// Whether this error is fatal.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Whether the operation was refused because of the journal's state
    /// rather than its input.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, MdLogError::InvalidState(_) | MdLogError::NoOpenSegment)
    }

    /// Completion status equivalent.
    pub fn status(&self) -> Status {
        match self {
            MdLogError::WriteFailed(status) => *status,
            MdLogError::Backend(e) => e.status(),
            _ => Status::EINVAL,
        }
    }
}

/// Result type for journal core operations
pub type MdLogResult<T> = Result<T, MdLogError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_codes() {
        assert_eq!(MdLogError::NoOpenSegment.code(), "MDLOG_NO_OPEN_SEGMENT");
        assert_eq!(
            MdLogError::EventTooLarge { size: 10, threshold: 5 }.code(),
            "MDLOG_EVENT_TOO_LARGE"
        );
        assert_eq!(
            MdLogError::from(JournalError::corruption_at_offset(0, "bad")).code(),
            "JOURNAL_CORRUPTION"
        );
    }

    #[test]
    fn test_write_failed_is_fatal_and_keeps_status() {
        let err = MdLogError::WriteFailed(Status::EIO);
        assert!(err.is_fatal());
        assert_eq!(err.status(), Status::EIO);
    }

    #[test]
    fn test_backend_severity_follows_backend() {
        let fatal = MdLogError::from(JournalError::AppendFailed {
            offset: 0,
            source: io::Error::new(io::ErrorKind::Other, "disk"),
        });
        assert!(fatal.is_fatal());

        let plain = MdLogError::from(JournalError::HeadMissing("none".into()));
        assert!(!plain.is_fatal());
        assert_eq!(plain.status(), Status::EINVAL);
    }

    #[test]
    fn test_invalid_state_family() {
        assert!(MdLogError::NoOpenSegment.is_invalid_state());
        assert!(MdLogError::invalid_state("stopped").is_invalid_state());
        assert!(!MdLogError::Config("x".into()).is_invalid_state());
    }
}
