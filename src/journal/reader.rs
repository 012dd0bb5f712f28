//! Sequential record reader for replay
//!
//! Reads framed records out of a byte range recovered from the backend.
//!
//! - A truncated final record is a torn tail: replay ends cleanly before it.
//! - A record whose framing is intact but whose contents are invalid is
//!   corruption. With `skip_corrupt` the reader steps over it; without, the
//!   read fails.
//! - A nonsensical length field cannot be stepped over and always fails.

use super::errors::{JournalError, JournalResult};
use super::record::{DecodeError, JournalRecord};

/// Reader over recovered journal bytes.
pub struct RecordReader<'a> {
    data: &'a [u8],
    /// Logical offset of `data[0]`.
    base: u64,
    pos: usize,
    skip_corrupt: bool,
    skipped: usize,
    torn_tail: bool,
}

impl<'a> RecordReader<'a> {
    /// Create a reader over `data`, which begins at logical offset `base`.
    pub fn new(data: &'a [u8], base: u64, skip_corrupt: bool) -> Self {
        Self {
            data,
            base,
            pos: 0,
            skip_corrupt,
            skipped: 0,
            torn_tail: false,
        }
    }

    /// Logical offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Number of corrupt records skipped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Whether reading stopped at a truncated final record.
    pub fn torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Read the next record and its logical start offset.
    ///
    /// Returns `Ok(None)` at the end of valid data.
    pub fn read_next(&mut self) -> JournalResult<Option<(u64, JournalRecord)>> {
        loop {
            if self.pos >= self.data.len() || self.torn_tail {
                return Ok(None);
            }

            let offset = self.position();
            match JournalRecord::decode(&self.data[self.pos..]) {
                Ok((record, len)) => {
                    self.pos += len;
                    return Ok(Some((offset, record)));
                }
                Err(DecodeError::Truncated { .. }) => {
                    self.torn_tail = true;
                    return Ok(None);
                }
                Err(DecodeError::BadLength(len)) => {
                    return Err(JournalError::corruption_at_offset(
                        offset,
                        format!("invalid record length {}", len),
                    ));
                }
                Err(DecodeError::Corrupt { len, reason }) => {
                    if !self.skip_corrupt {
                        return Err(JournalError::corruption_at_offset(offset, reason));
                    }
                    self.skipped += 1;
                    self.pos += len;
                }
            }
        }
    }
}
