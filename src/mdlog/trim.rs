//! Trim and expiration engine
//!
//! A segment may be expired only if all of these hold:
//! 1. it is older than the last major segment (or, with no major segment
//!    yet, older than the first segment, which nothing is)
//! 2. it is not the newest segment
//! 3. it is `Closed` and not retained as a zombie
//! 4. its last byte is durable (`end <= safe_pos`)
//!
//! Expiring a segment hands it to the [`SegmentExpirer`] with a gather; the
//! gather's terminal status decides the outcome. Expired segments are removed
//! only from the oldest end, each removal advancing the read position.

use std::sync::Arc;

use super::segment::{LogSegment, SegmentInfo, SegmentState, SegmentStore};
use super::{LogState, MdLog};
use crate::completion::{Completion, GatherBuilder, Status};
use crate::config::RetentionPolicy;
use crate::observability::{log_event_with_fields, Event};

/// Per-segment expiration procedure supplied by the journal's owner.
///
/// Called with the owning lock held. Work that must finish before the
/// segment can go takes a sub-completion from `gather` and completes it,
/// from any thread, when done. It must not try to lock the journal.
pub trait SegmentExpirer: Send + Sync {
    fn expire(&self, segment: &SegmentInfo, gather: &mut GatherBuilder);
}

/// Expiration with no external work: segments expire immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopExpirer;

impl SegmentExpirer for NoopExpirer {
    fn expire(&self, _segment: &SegmentInfo, _gather: &mut GatherBuilder) {}
}

/// Offsets of the segments rules 1-4 allow to expire, oldest first.
fn eligible_segments(store: &SegmentStore, safe_pos: u64) -> Vec<u64> {
    let Some(newest) = store.newest().map(LogSegment::offset) else {
        return Vec::new();
    };
    let boundary = store
        .last_major_segment()
        .or_else(|| store.oldest())
        .map_or(newest, LogSegment::offset);

    store
        .segments()
        .take_while(|s| s.offset() < boundary && s.offset() != newest)
        .filter(|s| s.state() == SegmentState::Closed && !s.is_zombie() && s.end() <= safe_pos)
        .map(LogSegment::offset)
        .collect()
}

impl MdLog {
    /// Expire every eligible segment, ignoring size thresholds.
    ///
    /// Returns the number of segments that started expiring.
    pub fn trim_all(&mut self) -> usize {
        if self.state != LogState::Active {
            return 0;
        }
        let policy = Arc::clone(&self.policy);
        let candidates = eligible_segments(&self.segments, self.positions.safe());

        candidates
            .into_iter()
            .filter(|&key| self.start_expiring(key, &policy))
            .count()
    }

    /// Expire the oldest eligible segments while the journal holds more
    /// live segments than `max_segments` or more events than `max_events`.
    ///
    /// Returns the number of segments that started expiring.
    pub fn trim(&mut self) -> usize {
        if self.state != LogState::Active {
            return 0;
        }
        let policy = Arc::clone(&self.policy);
        let candidates = eligible_segments(&self.segments, self.positions.safe());

        let (mut live_segments, mut live_events) = self
            .segments
            .segments()
            .filter(|s| matches!(s.state(), SegmentState::Open | SegmentState::Closed))
            .fold((0u64, 0u64), |(n, e), s| (n + 1, e + s.num_events()));

        let mut started = 0;
        for key in candidates {
            if live_segments <= policy.max_segments && !policy.events_over_limit(live_events) {
                break;
            }
            let events = self.segments.get(key).map_or(0, LogSegment::num_events);
            if self.start_expiring(key, &policy) {
                started += 1;
                live_segments -= 1;
                live_events -= events;
            }
        }
        started
    }

    /// Remove expired segments from the oldest end and advance the read
    /// position past them. Does not look for new candidates.
    ///
    /// Returns the number of segments removed.
    pub fn trim_expired_segments(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let key = match self.segments.oldest() {
                Some(oldest) if oldest.state() == SegmentState::Expired => oldest.offset(),
                _ => break,
            };
            let segment = self.segments.remove(key);
            self.positions.advance_read(segment.end());
            self.ctx.metrics.increment_segments_trimmed();
            log_event_with_fields(
                Event::SegmentTrimmed,
                &[
                    ("seq", &segment.seq().to_string()),
                    ("offset", &segment.offset().to_string()),
                    ("read_pos", &self.positions.read().to_string()),
                ],
            );
            removed += 1;
        }

        if removed > 0 {
            self.ctx.backend.set_expire_pos(self.positions.read());
        }
        removed
    }

    /// Register `on_expired` to fire once every segment expiring now has
    /// finished, with the first failure status if any failed.
    ///
    /// Returns false, without registering, if nothing is expiring.
    pub fn await_expiring_segments(&mut self, on_expired: Completion) -> bool {
        let mut gather = GatherBuilder::new();
        for segment in self.segments.segments_mut() {
            if segment.state() == SegmentState::Expiring {
                segment.expiry_waiters.push(gather.new_sub());
            }
        }
        if !gather.has_subs() {
            return false;
        }

        let finisher = self.ctx.finisher.clone();
        gather.activate(Completion::new(move |status| {
            finisher.queue(on_expired, status)
        }));
        true
    }

    /// Number of segments with an expiration in flight.
    pub fn num_expiring_segments(&self) -> usize {
        self.segments.num_expiring()
    }

    /// Move `key` to `Expiring` and run its expiration procedure.
    ///
    /// Returns false if zombie debugging retained the segment instead.
    fn start_expiring(&mut self, key: u64, policy: &RetentionPolicy) -> bool {
        let Some(segment) = self.segments.get_mut(key) else {
            return false;
        };
        segment.set_state(SegmentState::Expiring);
        let info = segment.info();

        let mut gather = GatherBuilder::new();
        self.ctx.expirer.expire(&info, &mut gather);

        if !gather.has_subs() && policy.debug_zombie_log_segments {
            if let Some(segment) = self.segments.get_mut(key) {
                segment.set_state(SegmentState::Closed);
                segment.mark_zombie();
            }
            log_event_with_fields(
                Event::SegmentZombie,
                &[("seq", &info.seq.to_string()), ("offset", &key.to_string())],
            );
            return false;
        }

        self.ctx.metrics.increment_segments_expiring();
        log_event_with_fields(
            Event::SegmentExpiring,
            &[
                ("seq", &info.seq.to_string()),
                ("offset", &key.to_string()),
                ("end", &info.end.to_string()),
                ("subs", &gather.num_subs().to_string()),
            ],
        );

        let on_done = self.deferred(move |log: &mut MdLog, status: Status| {
            log.handle_segment_expired(key, status)
        });
        gather.activate(Completion::new(on_done));
        true
    }

    fn handle_segment_expired(&mut self, key: u64, status: Status) {
        if self.state != LogState::Active {
            return;
        }
        let Some(segment) = self.segments.get_mut(key) else {
            return;
        };
        if segment.state() != SegmentState::Expiring {
            return;
        }

        let waiters = std::mem::take(&mut segment.expiry_waiters);
        let seq = segment.seq();
        if status.is_ok() {
            segment.set_state(SegmentState::Expired);
            self.ctx.metrics.increment_segments_expired();
            log_event_with_fields(
                Event::SegmentExpired,
                &[("seq", &seq.to_string()), ("offset", &key.to_string())],
            );
        } else {
            segment.set_state(SegmentState::Closed);
            log_event_with_fields(
                Event::SegmentExpireFailed,
                &[
                    ("seq", &seq.to_string()),
                    ("offset", &key.to_string()),
                    ("status", &status.to_string()),
                ],
            );
        }

        for waiter in waiters {
            self.ctx.finisher.queue(waiter, status);
        }
        if status.is_ok() {
            self.trim_expired_segments();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdlog::event::BoundaryKind;
    use BoundaryKind::{Major, Minor};

    fn build(kinds: &[BoundaryKind]) -> SegmentStore {
        let mut store = SegmentStore::new();
        for (i, kind) in kinds.iter().enumerate() {
            let key = store.open_segment(*kind, i as u64 * 100);
            store.append_event(key, 100).unwrap();
        }
        store
    }

    #[test]
    fn test_everything_before_last_major() {
        let store = build(&[Major, Minor, Major, Minor, Minor]);
        assert_eq!(eligible_segments(&store, u64::MAX), vec![0, 100]);
    }

    #[test]
    fn test_no_major_retains_everything() {
        let store = build(&[Minor, Minor, Minor]);
        assert!(eligible_segments(&store, u64::MAX).is_empty());
    }

    #[test]
    fn test_newest_is_never_eligible() {
        let store = build(&[Major, Major]);
        assert_eq!(eligible_segments(&store, u64::MAX), vec![0]);

        let store = build(&[Major]);
        assert!(eligible_segments(&store, u64::MAX).is_empty());
    }

    #[test]
    fn test_unsafe_segments_are_not_eligible() {
        let store = build(&[Major, Major, Major]);
        assert_eq!(eligible_segments(&store, 150), vec![0]);
        assert!(eligible_segments(&store, 50).is_empty());
    }

    #[test]
    fn test_expiring_and_zombie_segments_are_skipped() {
        let mut store = build(&[Major, Minor, Minor, Major]);
        store.get_mut(0).unwrap().set_state(SegmentState::Expiring);
        store.get_mut(100).unwrap().mark_zombie();
        assert_eq!(eligible_segments(&store, u64::MAX), vec![200]);
    }

    #[test]
    fn test_boundary_is_store_last_major() {
        let mut store = build(&[Major, Minor, Major, Minor]);
        let boundary = store.last_major_segment().unwrap().offset();
        assert_eq!(boundary, 200);
        assert_eq!(eligible_segments(&store, u64::MAX), vec![0, 100]);

        store.get_mut(0).unwrap().set_state(SegmentState::Expired);
        store.remove(0);
        assert_eq!(store.last_major_segment().unwrap().offset(), 200);
        assert_eq!(eligible_segments(&store, u64::MAX), vec![100]);
    }
}
