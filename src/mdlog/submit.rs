//! Submission pipeline
//!
//! `submit_entry` never blocks and never performs backend I/O. It validates
//! the event, places it in a segment, encodes it into the pending batch and
//! advances the write position by the event's serialized length. Ordering is
//! whatever order the lock holder submits in.

use super::errors::{MdLogError, MdLogResult};
use super::event::{BoundaryKind, EventKind, LogEvent};
use super::MdLog;
use crate::completion::Completion;
use crate::config::LargeEventAction;
use crate::journal::{JournalRecord, RecordKind, WriteBatch};
use crate::observability::{log_event_with_fields, Event, Logger};

/// What happened to a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Event journaled at `offset`, occupying `len` bytes.
    Submitted { offset: u64, len: u64 },
    /// Event exceeded the large-event threshold and was dropped by policy.
    Dropped,
}

impl SubmitOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, SubmitOutcome::Dropped)
    }
}

/// Records encoded since the last flush.
///
/// Records are serialized as they are submitted and concatenated into one
/// contiguous buffer, so a flush is a single backend append.
#[derive(Debug)]
pub(crate) struct PendingBatch {
    batch: WriteBatch,
}

impl PendingBatch {
    pub(crate) fn new(start: u64) -> Self {
        Self {
            batch: WriteBatch::new(start),
        }
    }

    pub(crate) fn push(&mut self, kind: RecordKind, payload: &[u8]) {
        JournalRecord::encode_into(kind, payload, self.batch.buffer_mut());
        self.batch.note_record();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Pending bytes.
    pub(crate) fn len(&self) -> u64 {
        self.batch.end() - self.batch.start()
    }

    pub(crate) fn records(&self) -> usize {
        self.batch.records()
    }

    /// Take the accumulated batch, leaving an empty one at its end.
    pub(crate) fn take(&mut self) -> WriteBatch {
        let end = self.batch.end();
        std::mem::replace(&mut self.batch, WriteBatch::new(end))
    }
}

impl MdLog {
    /// Submit an event.
    ///
    /// A boundary event opens a new segment (closing the current one) and
    /// becomes its first event. A regular event goes into the open segment;
    /// if there is none the submission fails with `NoOpenSegment`.
    pub fn submit_entry(&mut self, event: LogEvent) -> MdLogResult<SubmitOutcome> {
        self.ensure_active("submit_entry")?;
        if let Some(status) = self.failure {
            return Err(MdLogError::WriteFailed(status));
        }

        let len = event.serialized_len();
        if !event.is_boundary() && self.segments.open().is_none() {
            return Err(MdLogError::NoOpenSegment);
        }
        if len > self.policy.event_large_threshold {
            if let Some(outcome) = self.handle_large_event(&event, len)? {
                return Ok(outcome);
            }
        }

        let outcome = self.journal_event(&event, len)?;
        if !event.is_boundary() {
            self.events_since_major += 1;
            self.maybe_start_boundary();
        }
        Ok(outcome)
    }

    /// Place an accepted event in its segment and encode it into the pending
    /// batch.
    fn journal_event(&mut self, event: &LogEvent, len: u64) -> MdLogResult<SubmitOutcome> {
        let key = match event.kind() {
            EventKind::Boundary(kind) => {
                let key = self.segments.open_segment(kind, self.positions.write());
                if kind.is_major() {
                    self.events_since_major = 0;
                }
                self.ctx.metrics.increment_segments_opened();
                if let Some(segment) = self.segments.get(key) {
                    log_event_with_fields(
                        Event::SegmentOpen,
                        &[
                            ("seq", &segment.seq().to_string()),
                            ("offset", &key.to_string()),
                            ("kind", kind.as_str()),
                        ],
                    );
                }
                key
            }
            EventKind::Regular => self
                .segments
                .open()
                .map(|segment| segment.offset())
                .ok_or(MdLogError::NoOpenSegment)?,
        };

        self.segments.append_event(key, len)?;
        let offset = self.positions.write();
        self.pending.push(event.record_kind(), event.payload());
        self.positions.advance_write(len);
        self.ctx.metrics.record_submit(len);
        Ok(SubmitOutcome::Submitted { offset, len })
    }

    /// Submit an event and register `on_safe` for the resulting write
    /// position. `on_safe` fires even if the event is dropped, and fires with
    /// the error's status if the submission fails.
    pub fn submit_entry_with(
        &mut self,
        event: LogEvent,
        on_safe: Completion,
    ) -> MdLogResult<SubmitOutcome> {
        match self.submit_entry(event) {
            Ok(outcome) => {
                self.wait_for_safe(on_safe);
                Ok(outcome)
            }
            Err(e) => {
                self.complete_later(on_safe, e.status());
                Err(e)
            }
        }
    }

    /// Apply the large-event policy. `Some` ends the submission.
    fn handle_large_event(
        &mut self,
        event: &LogEvent,
        len: u64,
    ) -> MdLogResult<Option<SubmitOutcome>> {
        let threshold = self.policy.event_large_threshold;
        let fields = [
            ("size", len.to_string()),
            ("threshold", threshold.to_string()),
            ("boundary", event.is_boundary().to_string()),
        ];
        let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();

        if self.policy.skip_unbounded_events {
            log_event_with_fields(Event::LargeEventDropped, &fields);
            self.ctx.metrics.increment_large_events_dropped();
            return Ok(Some(SubmitOutcome::Dropped));
        }

        match self.policy.large_event_action {
            LargeEventAction::Reject => {
                log_event_with_fields(Event::LargeEventRejected, &fields);
                self.ctx.metrics.increment_large_events_rejected();
                Err(MdLogError::EventTooLarge {
                    size: len,
                    threshold,
                })
            }
            LargeEventAction::Warn => {
                log_event_with_fields(Event::LargeEventAccepted, &fields);
                Ok(None)
            }
        }
    }

    /// Start a boundary after a regular event when the open segment or the
    /// run since the last major boundary has grown past policy.
    ///
    /// Automatic boundaries are the journal's own events: the large-event
    /// policy does not apply to them, and a failure here never fails the
    /// regular event that triggered it.
    fn maybe_start_boundary(&mut self) {
        let Some(open) = self.segments.open() else {
            return;
        };

        let kind = if self.events_since_major > self.policy.major_boundary_events() {
            BoundaryKind::Major
        } else if open.num_events() >= self.policy.events_per_segment {
            BoundaryKind::Minor
        } else {
            return;
        };

        let payload = self
            .ctx
            .boundary_source
            .boundary_payload(kind, open.seq() + 1);
        let event = LogEvent::boundary(kind, payload);
        let len = event.serialized_len();
        if len > self.policy.event_large_threshold {
            Logger::warn(
                "AUTO_BOUNDARY_OVERSIZED",
                &[
                    ("kind", kind.as_str()),
                    ("size", &len.to_string()),
                    ("threshold", &self.policy.event_large_threshold.to_string()),
                ],
            );
        }

        if let Err(e) = self.journal_event(&event, len) {
            Logger::error(
                "AUTO_BOUNDARY_FAILED",
                &[
                    ("kind", kind.as_str()),
                    ("code", e.code()),
                    ("error", &e.to_string()),
                ],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_batch_take_continues_at_end() {
        let mut pending = PendingBatch::new(100);
        assert!(pending.is_empty());

        pending.push(RecordKind::Major, b"abc");
        pending.push(RecordKind::Regular, b"de");
        assert_eq!(pending.records(), 2);
        let expected = (JournalRecord::serialized_len(3) + JournalRecord::serialized_len(2)) as u64;
        assert_eq!(pending.len(), expected);

        let batch = pending.take();
        assert_eq!(batch.start(), 100);
        assert_eq!(batch.end(), 100 + expected);
        assert!(pending.is_empty());

        pending.push(RecordKind::Regular, b"f");
        assert_eq!(pending.take().start(), 100 + expected);
    }
}
