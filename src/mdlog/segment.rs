//! Segment store
//!
//! Segments are keyed by start offset in a `BTreeMap`, so iteration is in
//! offset order and the oldest segment is always the first entry. Every
//! segment starts with its own boundary event and runs until the next
//! boundary; the newest segment is the only open one.
//!
//! Lifecycle: `Open -> Closed -> Expiring -> Expired -> removed`. An
//! expiration that fails returns the segment to `Closed`.

use std::collections::btree_map::{BTreeMap, Values};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::errors::{MdLogError, MdLogResult};
use super::event::BoundaryKind;
use crate::completion::Completion;

/// Segment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentState {
    /// Newest segment, accepting events
    Open,
    /// Superseded by a newer boundary; eligible for expiration
    Closed,
    /// Expiration procedure in flight
    Expiring,
    /// Expiration finished; waiting to be removed from the oldest end
    Expired,
}

/// A contiguous run of events starting at a boundary event.
#[derive(Debug)]
pub struct LogSegment {
    seq: u64,
    offset: u64,
    bytes: u64,
    num_events: u64,
    kind: BoundaryKind,
    state: SegmentState,
    opened_at: DateTime<Utc>,
    zombie: bool,
    pub(crate) expiry_waiters: Vec<Completion>,
}

impl LogSegment {
    fn new(seq: u64, offset: u64, kind: BoundaryKind) -> Self {
        Self {
            seq,
            offset,
            bytes: 0,
            num_events: 0,
            kind,
            state: SegmentState::Open,
            opened_at: Utc::now(),
            zombie: false,
            expiry_waiters: Vec::new(),
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Offset of the boundary event that opened the segment.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset one past the segment's last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.bytes
    }

    pub fn num_events(&self) -> u64 {
        self.num_events
    }

    pub fn kind(&self) -> BoundaryKind {
        self.kind
    }

    pub fn is_major(&self) -> bool {
        self.kind.is_major()
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    pub fn is_zombie(&self) -> bool {
        self.zombie
    }

    pub(crate) fn set_state(&mut self, state: SegmentState) {
        self.state = state;
    }

    pub(crate) fn mark_zombie(&mut self) {
        self.zombie = true;
    }

    /// Read-only snapshot.
    pub fn info(&self) -> SegmentInfo {
        SegmentInfo {
            seq: self.seq,
            offset: self.offset,
            end: self.end(),
            num_events: self.num_events,
            kind: self.kind,
            state: self.state,
            zombie: self.zombie,
            opened_at: self.opened_at,
        }
    }
}

/// Snapshot of a segment, handed to expiration procedures and tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub seq: u64,
    pub offset: u64,
    pub end: u64,
    pub num_events: u64,
    pub kind: BoundaryKind,
    pub state: SegmentState,
    pub zombie: bool,
    pub opened_at: DateTime<Utc>,
}

/// Ordered collection of segments.
#[derive(Debug, Default)]
pub struct SegmentStore {
    segments: BTreeMap<u64, LogSegment>,
    next_seq: u64,
    num_events: u64,
    last_major: Option<u64>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the open segment, if any, and open a new one at `offset`.
    ///
    /// Returns the new segment's key (its start offset).
    pub fn open_segment(&mut self, kind: BoundaryKind, offset: u64) -> u64 {
        if let Some(current) = self.segments.values_mut().next_back() {
            assert!(
                offset >= current.end(),
                "segment at {} overlaps segment {} ending at {}",
                offset,
                current.seq,
                current.end()
            );
            if current.state == SegmentState::Open {
                current.state = SegmentState::Closed;
            }
        }

        self.next_seq += 1;
        self.segments
            .insert(offset, LogSegment::new(self.next_seq, offset, kind));
        if kind.is_major() {
            self.last_major = Some(offset);
        }
        offset
    }

    /// Account `len` bytes of a new event to the segment at `key`.
    pub fn append_event(&mut self, key: u64, len: u64) -> MdLogResult<()> {
        let segment = self.segments.get_mut(&key).ok_or_else(|| {
            MdLogError::invalid_state(format!("no segment at offset {}", key))
        })?;
        match segment.state {
            SegmentState::Expiring | SegmentState::Expired => {
                return Err(MdLogError::invalid_state(format!(
                    "segment {} is {:?}",
                    segment.seq, segment.state
                )));
            }
            SegmentState::Open | SegmentState::Closed => {}
        }
        segment.num_events += 1;
        segment.bytes += len;
        self.num_events += 1;
        Ok(())
    }

    /// Extend the newest segment so it ends at `end`, covering bytes that
    /// hold no event. Never shrinks.
    pub(crate) fn extend_newest(&mut self, end: u64) {
        if let Some(newest) = self.segments.values_mut().next_back() {
            if end > newest.end() {
                newest.bytes = end - newest.offset;
            }
        }
    }

    /// The open segment.
    pub fn open(&self) -> Option<&LogSegment> {
        self.newest().filter(|s| s.state == SegmentState::Open)
    }

    pub fn oldest(&self) -> Option<&LogSegment> {
        self.segments.values().next()
    }

    pub fn newest(&self) -> Option<&LogSegment> {
        self.segments.values().next_back()
    }

    pub fn get(&self, key: u64) -> Option<&LogSegment> {
        self.segments.get(&key)
    }

    pub fn get_mut(&mut self, key: u64) -> Option<&mut LogSegment> {
        self.segments.get_mut(&key)
    }

    /// Segments in offset order. Call again to restart.
    pub fn segments(&self) -> Values<'_, u64, LogSegment> {
        self.segments.values()
    }

    pub(crate) fn segments_mut(&mut self) -> impl Iterator<Item = &mut LogSegment> {
        self.segments.values_mut()
    }

    /// Most recent major segment.
    pub fn last_major_segment(&self) -> Option<&LogSegment> {
        self.last_major.and_then(|key| self.segments.get(&key))
    }

    /// Remove the segment at `key`.
    ///
    /// Only the oldest segment can be removed, and only once its expiration
    /// has finished and nothing is waiting on it.
    pub fn remove(&mut self, key: u64) -> LogSegment {
        let oldest = self.segments.keys().next().copied();
        assert_eq!(oldest, Some(key), "segment at {} is not the oldest", key);

        let segment = self
            .segments
            .remove(&key)
            .expect("oldest segment vanished");
        assert_eq!(
            segment.state,
            SegmentState::Expired,
            "removing segment {} before expiration finished",
            segment.seq
        );
        assert!(
            segment.expiry_waiters.is_empty(),
            "removing segment {} with pending waiters",
            segment.seq
        );

        self.num_events -= segment.num_events;
        if self.last_major == Some(key) {
            self.last_major = None;
        }
        segment
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Events in all segments still in the store.
    pub fn num_events(&self) -> u64 {
        self.num_events
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments with an expiration in flight.
    pub fn num_expiring(&self) -> usize {
        self.segments
            .values()
            .filter(|s| s.state == SegmentState::Expiring)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(kinds: &[(BoundaryKind, u64)]) -> SegmentStore {
        let mut store = SegmentStore::new();
        let mut offset = 0;
        for (kind, events) in kinds {
            let key = store.open_segment(*kind, offset);
            for _ in 0..*events {
                store.append_event(key, 10).unwrap();
                offset += 10;
            }
        }
        store
    }

    #[test]
    fn test_open_closes_previous() {
        let store = store_with(&[(BoundaryKind::Major, 3), (BoundaryKind::Minor, 2)]);

        let states: Vec<_> = store.segments().map(|s| s.state()).collect();
        assert_eq!(states, vec![SegmentState::Closed, SegmentState::Open]);
        assert_eq!(store.num_segments(), 2);
        assert_eq!(store.num_events(), 5);
        assert_eq!(store.open().unwrap().offset(), 30);
    }

    #[test]
    fn test_segments_are_contiguous() {
        let store = store_with(&[
            (BoundaryKind::Major, 2),
            (BoundaryKind::Minor, 4),
            (BoundaryKind::Minor, 1),
        ]);
        let segs: Vec<_> = store.segments().collect();
        for pair in segs.windows(2) {
            assert_eq!(pair[0].end(), pair[1].offset());
        }
    }

    #[test]
    fn test_extend_newest_covers_gap() {
        let mut store = store_with(&[(BoundaryKind::Major, 2)]);
        store.extend_newest(35);
        store.extend_newest(30);
        assert_eq!(store.newest().unwrap().end(), 35);
        assert_eq!(store.num_events(), 2);

        store.open_segment(BoundaryKind::Minor, 35);
        let segs: Vec<_> = store.segments().collect();
        assert_eq!(segs[0].end(), segs[1].offset());
    }

    #[test]
    fn test_last_major_segment() {
        let store = store_with(&[(BoundaryKind::Minor, 1)]);
        assert!(store.last_major_segment().is_none());

        let store = store_with(&[
            (BoundaryKind::Major, 1),
            (BoundaryKind::Major, 1),
            (BoundaryKind::Minor, 1),
        ]);
        assert_eq!(store.last_major_segment().unwrap().seq(), 2);
    }

    #[test]
    fn test_append_to_expiring_segment_fails() {
        let mut store = store_with(&[(BoundaryKind::Major, 1), (BoundaryKind::Major, 1)]);
        store.get_mut(0).unwrap().set_state(SegmentState::Expiring);

        let err = store.append_event(0, 10).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[test]
    fn test_remove_oldest_expired() {
        let mut store = store_with(&[(BoundaryKind::Major, 2), (BoundaryKind::Major, 1)]);
        store.get_mut(0).unwrap().set_state(SegmentState::Expired);

        let removed = store.remove(0);
        assert_eq!(removed.num_events(), 2);
        assert_eq!(store.num_events(), 1);
        assert_eq!(store.num_segments(), 1);
    }

    #[test]
    #[should_panic(expected = "before expiration finished")]
    fn test_remove_unexpired_panics() {
        let mut store = store_with(&[(BoundaryKind::Major, 2), (BoundaryKind::Major, 1)]);
        store.get_mut(0).unwrap().set_state(SegmentState::Closed);
        store.remove(0);
    }

    #[test]
    #[should_panic(expected = "is not the oldest")]
    fn test_remove_out_of_order_panics() {
        let mut store = store_with(&[(BoundaryKind::Major, 2), (BoundaryKind::Major, 1)]);
        store.remove(20);
    }
}
