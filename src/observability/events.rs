//! Observable journal events
//!
//! Events are explicit and typed; the string form is the `event` key of
//! each log line.

use std::fmt;

/// Observable events in the journal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Empty journal created
    JournalCreate,
    /// Existing journal opened and replayed
    JournalOpen,
    /// Journal shut down
    JournalShutdown,
    /// Replay skipped a corrupt record
    ReplaySkipCorrupt,

    // Submission
    /// New segment opened by a boundary event
    SegmentOpen,
    /// Oversized event accepted with a warning
    LargeEventAccepted,
    /// Oversized event dropped by policy
    LargeEventDropped,
    /// Oversized event rejected
    LargeEventRejected,

    // Durability
    /// Pending batch handed to the backend
    Flush,
    /// Backend write failed; journal is read-only (FATAL)
    WriteFailed,

    // Expiration
    /// Segment selected for expiration
    SegmentExpiring,
    /// Segment expiration procedure finished
    SegmentExpired,
    /// Segment expiration procedure failed
    SegmentExpireFailed,
    /// Segment retained by zombie debugging
    SegmentZombie,
    /// Expired segment removed and read position advanced
    SegmentTrimmed,

    // Configuration
    /// Retention policy recomputed
    ConfigChanged,
    /// Malformed configuration value ignored
    ConfigRejected,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::JournalCreate => "JOURNAL_CREATE",
            Event::JournalOpen => "JOURNAL_OPEN",
            Event::JournalShutdown => "JOURNAL_SHUTDOWN",
            Event::ReplaySkipCorrupt => "REPLAY_SKIP_CORRUPT",
            Event::SegmentOpen => "SEGMENT_OPEN",
            Event::LargeEventAccepted => "LARGE_EVENT_ACCEPTED",
            Event::LargeEventDropped => "LARGE_EVENT_DROPPED",
            Event::LargeEventRejected => "LARGE_EVENT_REJECTED",
            Event::Flush => "FLUSH",
            Event::WriteFailed => "WRITE_FAILED",
            Event::SegmentExpiring => "SEGMENT_EXPIRING",
            Event::SegmentExpired => "SEGMENT_EXPIRED",
            Event::SegmentExpireFailed => "SEGMENT_EXPIRE_FAILED",
            Event::SegmentZombie => "SEGMENT_ZOMBIE",
            Event::SegmentTrimmed => "SEGMENT_TRIMMED",
            Event::ConfigChanged => "CONFIG_CHANGED",
            Event::ConfigRejected => "CONFIG_REJECTED",
        }
    }

    /// Whether this event means the journal can no longer guarantee durability
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::WriteFailed)
    }

    /// Whether this event reports a recoverable problem
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Event::ReplaySkipCorrupt
                | Event::LargeEventAccepted
                | Event::LargeEventDropped
                | Event::LargeEventRejected
                | Event::SegmentExpireFailed
                | Event::SegmentZombie
                | Event::ConfigRejected
        )
    }

    /// Whether this event is high-frequency detail
    pub fn is_trace(&self) -> bool {
        matches!(self, Event::Flush | Event::SegmentOpen)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
