//! Journal head
//!
//! The head is the small piece of metadata stored beside the record stream:
//! which journal this is and how far it has been expired. Replay starts at
//! `expire_pos`; everything before it has been reclaimed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current on-disk head format.
pub const HEAD_FORMAT_VERSION: u32 = 1;

/// Persistent journal metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalHead {
    /// Head format version
    pub format_version: u32,
    /// Identity of this journal, assigned at creation
    pub journal_id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Offset of the first record still needed for replay
    pub expire_pos: u64,
}

impl JournalHead {
    /// Head for a freshly created journal starting at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            format_version: HEAD_FORMAT_VERSION,
            journal_id: Uuid::new_v4(),
            created_at: Utc::now(),
            expire_pos: start,
        }
    }

    /// Copy of this head with a new expire position.
    pub fn with_expire_pos(&self, expire_pos: u64) -> Self {
        Self {
            expire_pos,
            ..self.clone()
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
