//! Journal record framing
//!
//! Each record is laid out as:
//! - Record Length (u32 LE), covering the whole record
//! - Record Kind (u8): REGULAR / MAJOR / MINOR
//! - Flags (u8), reserved, always zero
//! - Payload (variable)
//! - Checksum (u32 LE), CRC32 over every preceding byte of the record
//!
//! The payload is opaque to the journal.

use crc32fast::Hasher;

/// Length + kind + flags.
pub const RECORD_HEADER_SIZE: usize = 4 + 1 + 1;
/// Checksum trailer.
pub const RECORD_TRAILER_SIZE: usize = 4;
/// Framing bytes added to every payload.
pub const RECORD_OVERHEAD: usize = RECORD_HEADER_SIZE + RECORD_TRAILER_SIZE;
/// Upper bound on a single record, used to detect garbage length fields.
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Record kinds as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Ordinary journaled mutation
    Regular = 0,
    /// Major segment boundary (replay root)
    Major = 1,
    /// Minor segment boundary
    Minor = 2,
}

impl RecordKind {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::Regular),
            1 => Some(RecordKind::Major),
            2 => Some(RecordKind::Minor),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether this record starts a segment
    pub fn is_boundary(self) -> bool {
        !matches!(self, RecordKind::Regular)
    }
}

/// A decoded journal record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub kind: RecordKind,
    pub payload: Vec<u8>,
}

/// Why a record at some position could not be decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain than the record needs.
    Truncated { needed: usize, available: usize },
    /// The length field is nonsensical; the stream cannot be resynchronized.
    BadLength(u32),
    /// Framing is intact but the contents are invalid; `len` bytes can be skipped.
    Corrupt { len: usize, reason: String },
}

impl JournalRecord {
    /// Create a record.
    pub fn new(kind: RecordKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Size of a serialized record with `payload_len` payload bytes.
    pub fn serialized_len(payload_len: usize) -> usize {
        RECORD_OVERHEAD + payload_len
    }

    /// Serialize into `buf`.
    pub fn encode_into(kind: RecordKind, payload: &[u8], buf: &mut Vec<u8>) {
        let start = buf.len();
        let total = Self::serialized_len(payload.len()) as u32;

        buf.extend_from_slice(&total.to_le_bytes());
        buf.push(kind.as_u8());
        buf.push(0);
        buf.extend_from_slice(payload);

        let checksum = compute_checksum(&buf[start..]);
        buf.extend_from_slice(&checksum.to_le_bytes());
    }

    /// Serialize to a new buffer.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::serialized_len(self.payload.len()));
        Self::encode_into(self.kind, &self.payload, &mut buf);
        buf
    }

    /// Decode the record at the start of `data`.
    ///
    /// Returns the record and the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), DecodeError> {
        if data.len() < 4 {
            return Err(DecodeError::Truncated {
                needed: 4,
                available: data.len(),
            });
        }
        let declared = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let len = declared as usize;
        if len < RECORD_OVERHEAD || len > MAX_RECORD_SIZE {
            return Err(DecodeError::BadLength(declared));
        }
        if data.len() < len {
            return Err(DecodeError::Truncated {
                needed: len,
                available: data.len(),
            });
        }

        let body = &data[..len - RECORD_TRAILER_SIZE];
        let stored = u32::from_le_bytes([
            data[len - 4],
            data[len - 3],
            data[len - 2],
            data[len - 1],
        ]);
        let computed = compute_checksum(body);
        if stored != computed {
            return Err(DecodeError::Corrupt {
                len,
                reason: format!(
                    "checksum mismatch: stored {:#010x}, computed {:#010x}",
                    stored, computed
                ),
            });
        }

        let kind = RecordKind::from_u8(data[4]).ok_or_else(|| DecodeError::Corrupt {
            len,
            reason: format!("unknown record kind {}", data[4]),
        })?;
        if data[5] != 0 {
            return Err(DecodeError::Corrupt {
                len,
                reason: format!("unknown record flags {:#04x}", data[5]),
            });
        }

        let payload = data[RECORD_HEADER_SIZE..len - RECORD_TRAILER_SIZE].to_vec();
        Ok((Self { kind, payload }, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let data = b"journal bytes";
        assert_eq!(compute_checksum(data), compute_checksum(data));
        assert_ne!(compute_checksum(b"a"), compute_checksum(b"b"));
    }

    #[test]
    fn test_serialized_len_matches_encoding() {
        let record = JournalRecord::new(RecordKind::Minor, vec![7; 33]);
        let bytes = record.serialize();
        assert_eq!(bytes.len(), JournalRecord::serialized_len(33));
        assert_eq!(bytes.len(), 33 + RECORD_OVERHEAD);
    }

    #[test]
    fn test_decode_encoded_record() {
        let record = JournalRecord::new(RecordKind::Major, b"subtree map".to_vec());
        let mut bytes = record.serialize();
        bytes.extend_from_slice(b"trailing");

        let (decoded, used) = JournalRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(used, bytes.len() - 8);
    }

    #[test]
    fn test_decode_detects_bit_flip() {
        let mut bytes = JournalRecord::new(RecordKind::Regular, vec![1, 2, 3]).serialize();
        bytes[7] ^= 0xFF;

        match JournalRecord::decode(&bytes) {
            Err(DecodeError::Corrupt { len, .. }) => assert_eq!(len, bytes.len()),
            other => panic!("expected corruption, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_truncated_tail() {
        let bytes = JournalRecord::new(RecordKind::Regular, vec![0; 16]).serialize();
        match JournalRecord::decode(&bytes[..bytes.len() - 1]) {
            Err(DecodeError::Truncated { needed, available }) => {
                assert_eq!(needed, bytes.len());
                assert_eq!(available, bytes.len() - 1);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_bad_length() {
        let bytes = [2u8, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(JournalRecord::decode(&bytes), Err(DecodeError::BadLength(2)));
    }

    #[test]
    fn test_boundary_kinds() {
        assert!(RecordKind::Major.is_boundary());
        assert!(RecordKind::Minor.is_boundary());
        assert!(!RecordKind::Regular.is_boundary());
        assert_eq!(RecordKind::from_u8(3), None);
    }
}
