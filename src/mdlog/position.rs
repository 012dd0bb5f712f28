//! Journal watermarks
//!
//! Three offsets into the logical byte stream:
//! - `write`: bytes handed to the submission pipeline
//! - `safe`: bytes acknowledged durable by the backend
//! - `read`: bytes whose segments have been expired and removed
//!
//! All three only move forward and `read <= safe <= write` always holds.
//! Violations are caller bugs and panic.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Positions {
    write: u64,
    safe: u64,
    read: u64,
}

impl Positions {
    /// All three watermarks at `start`.
    pub fn new(start: u64) -> Self {
        Self {
            write: start,
            safe: start,
            read: start,
        }
    }

    pub fn write(&self) -> u64 {
        self.write
    }

    pub fn safe(&self) -> u64 {
        self.safe
    }

    pub fn read(&self) -> u64 {
        self.read
    }

    /// Bytes submitted but not yet durable.
    pub fn unsafe_bytes(&self) -> u64 {
        self.write - self.safe
    }

    /// Advance the write position by `len` bytes. Returns the new position.
    pub fn advance_write(&mut self, len: u64) -> u64 {
        self.write = self
            .write
            .checked_add(len)
            .expect("write position overflow");
        self.write
    }

    /// Move the safe position to `to`.
    pub fn advance_safe(&mut self, to: u64) {
        assert!(
            to >= self.safe,
            "safe position moved backwards: {} -> {}",
            self.safe,
            to
        );
        assert!(
            to <= self.write,
            "safe position {} beyond write position {}",
            to,
            self.write
        );
        self.safe = to;
    }

    /// Move the read position to `to`.
    pub fn advance_read(&mut self, to: u64) {
        assert!(
            to >= self.read,
            "read position moved backwards: {} -> {}",
            self.read,
            to
        );
        assert!(
            to <= self.safe,
            "read position {} beyond safe position {}",
            to,
            self.safe
        );
        self.read = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_equal() {
        let pos = Positions::new(42);
        assert_eq!((pos.write(), pos.safe(), pos.read()), (42, 42, 42));
        assert_eq!(pos.unsafe_bytes(), 0);
    }

    #[test]
    fn test_advance_in_order() {
        let mut pos = Positions::new(0);
        assert_eq!(pos.advance_write(100), 100);
        pos.advance_safe(60);
        pos.advance_read(60);
        pos.advance_safe(100);
        assert_eq!(pos.unsafe_bytes(), 0);
        assert_eq!(pos.read(), 60);
    }

    #[test]
    #[should_panic(expected = "beyond write position")]
    fn test_safe_cannot_pass_write() {
        let mut pos = Positions::new(0);
        pos.advance_write(10);
        pos.advance_safe(11);
    }

    #[test]
    #[should_panic(expected = "beyond safe position")]
    fn test_read_cannot_pass_safe() {
        let mut pos = Positions::new(0);
        pos.advance_write(10);
        pos.advance_read(5);
    }

    #[test]
    #[should_panic(expected = "moved backwards")]
    fn test_safe_is_monotonic() {
        let mut pos = Positions::new(0);
        pos.advance_write(10);
        pos.advance_safe(8);
        pos.advance_safe(4);
    }
}
