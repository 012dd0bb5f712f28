//! Journal events
//!
//! Payloads are opaque to the journal. The only thing it interprets is the
//! event kind: regular events land in the open segment, boundary events open
//! a new one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::journal::{JournalRecord, RecordKind};

/// Tag carried by a segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    /// Full checkpoint: replay can start here with no prior context.
    Major,
    /// Lightweight marker subdividing the journal.
    Minor,
}

impl BoundaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryKind::Major => "major",
            BoundaryKind::Minor => "minor",
        }
    }

    pub fn is_major(&self) -> bool {
        matches!(self, BoundaryKind::Major)
    }

    fn record_kind(self) -> RecordKind {
        match self {
            BoundaryKind::Major => RecordKind::Major,
            BoundaryKind::Minor => RecordKind::Minor,
        }
    }
}

impl fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an event does to the segment structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Regular,
    Boundary(BoundaryKind),
}

/// A unit of journaled work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    kind: EventKind,
    payload: Vec<u8>,
}

impl LogEvent {
    pub fn new(kind: EventKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Regular event.
    pub fn regular(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(EventKind::Regular, payload.into())
    }

    /// Regular event padded with `len` zero bytes.
    pub fn noop(len: usize) -> Self {
        Self::regular(vec![0u8; len])
    }

    /// Boundary event.
    pub fn boundary(kind: BoundaryKind, payload: impl Into<Vec<u8>>) -> Self {
        Self::new(EventKind::Boundary(kind), payload.into())
    }

    /// Major boundary event.
    pub fn major(payload: impl Into<Vec<u8>>) -> Self {
        Self::boundary(BoundaryKind::Major, payload)
    }

    /// Minor boundary event.
    pub fn minor(payload: impl Into<Vec<u8>>) -> Self {
        Self::boundary(BoundaryKind::Minor, payload)
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self.kind, EventKind::Boundary(_))
    }

    /// Boundary tag, if this is a boundary event.
    pub fn boundary_kind(&self) -> Option<BoundaryKind> {
        match self.kind {
            EventKind::Boundary(kind) => Some(kind),
            EventKind::Regular => None,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes the event occupies in the journal stream.
    pub fn serialized_len(&self) -> u64 {
        JournalRecord::serialized_len(self.payload.len()) as u64
    }

    pub(crate) fn record_kind(&self) -> RecordKind {
        match self.kind {
            EventKind::Regular => RecordKind::Regular,
            EventKind::Boundary(kind) => kind.record_kind(),
        }
    }

    /// Event kind recorded for a replayed record.
    pub(crate) fn kind_of_record(kind: RecordKind) -> EventKind {
        match kind {
            RecordKind::Regular => EventKind::Regular,
            RecordKind::Major => EventKind::Boundary(BoundaryKind::Major),
            RecordKind::Minor => EventKind::Boundary(BoundaryKind::Minor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::RECORD_OVERHEAD;

    #[test]
    fn test_serialized_len_includes_framing() {
        let event = LogEvent::noop(100);
        assert_eq!(event.serialized_len(), 100 + RECORD_OVERHEAD as u64);
    }

    #[test]
    fn test_boundary_kinds() {
        assert_eq!(LogEvent::major(b"x".to_vec()).boundary_kind(), Some(BoundaryKind::Major));
        assert_eq!(LogEvent::minor(Vec::new()).boundary_kind(), Some(BoundaryKind::Minor));
        assert!(!LogEvent::regular(b"x".to_vec()).is_boundary());
    }

    #[test]
    fn test_record_kind_mapping_is_symmetric() {
        for event in [LogEvent::noop(1), LogEvent::major(Vec::new()), LogEvent::minor(Vec::new())] {
            assert_eq!(LogEvent::kind_of_record(event.record_kind()), event.kind());
        }
    }
}
