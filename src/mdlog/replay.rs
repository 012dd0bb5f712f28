//! Journal replay
//!
//! `open` rebuilds the segment structure of an existing journal from its
//! record stream. Payloads are not interpreted; only record kinds and
//! offsets matter.
//!
//! Replay starts at the persisted expire position. Records before the first
//! boundary cannot belong to a segment and are skipped. The stream ends at
//! the last valid record: a torn final record, or trailing records that
//! failed validation, are cut off so new appends continue from a clean end.

use serde::Serialize;

use super::errors::MdLogResult;
use super::event::{EventKind, LogEvent};
use super::segment::SegmentStore;
use super::{LogState, MdLog};
use crate::completion::{Completion, Status};
use crate::journal::RecordReader;
use crate::observability::{log_event_with_fields, Event, Logger};

/// What replay found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub segments: usize,
    pub events: u64,
    /// Records before the first boundary.
    pub orphaned_records: u64,
    /// Corrupt records stepped over.
    pub skipped_corrupt: usize,
    /// Bytes cut from the end of the stream.
    pub discarded_tail: u64,
}

impl MdLog {
    /// Open an existing journal and replay it. `on_ready` receives the
    /// status.
    pub fn open(&mut self, on_ready: Completion) {
        if self.state != LogState::Idle {
            Logger::warn(
                "JOURNAL_OPEN_REJECTED",
                &[("state", &format!("{:?}", self.state))],
            );
            self.complete_later(on_ready, Status::EINVAL);
            return;
        }

        match self.replay() {
            Ok(summary) => {
                self.state = LogState::Active;
                log_event_with_fields(
                    Event::JournalOpen,
                    &[
                        ("segments", &summary.segments.to_string()),
                        ("events", &summary.events.to_string()),
                        ("orphaned_records", &summary.orphaned_records.to_string()),
                        ("skipped_corrupt", &summary.skipped_corrupt.to_string()),
                        ("discarded_tail", &summary.discarded_tail.to_string()),
                        ("read_pos", &self.positions.read().to_string()),
                        ("write_pos", &self.positions.write().to_string()),
                    ],
                );
                self.complete_later(on_ready, Status::OK);
            }
            Err(e) => {
                Logger::error(
                    "JOURNAL_OPEN_FAILED",
                    &[("code", e.code()), ("error", &e.to_string())],
                );
                self.complete_later(on_ready, e.status());
            }
        }
    }

    fn replay(&mut self) -> MdLogResult<ReplaySummary> {
        let recovered = self.ctx.backend.recover()?;
        let start = recovered.head.expire_pos;
        let stored_end = start + recovered.data.len() as u64;

        let mut reader =
            RecordReader::new(&recovered.data, start, self.policy.skip_corrupt_events);
        let mut segments = SegmentStore::new();
        let mut summary = ReplaySummary::default();
        let mut events_since_major = 0;
        let mut valid_end = start;

        while let Some((offset, record)) = reader.read_next()? {
            let record_end = reader.position();
            let key = match LogEvent::kind_of_record(record.kind) {
                EventKind::Boundary(kind) => {
                    if kind.is_major() {
                        events_since_major = 0;
                    }
                    summary.segments += 1;
                    // Skipped corrupt records ending the previous segment
                    // stay accounted to it.
                    segments.extend_newest(offset);
                    segments.open_segment(kind, offset)
                }
                EventKind::Regular => match segments.open() {
                    Some(open) => {
                        events_since_major += 1;
                        open.offset()
                    }
                    None => {
                        summary.orphaned_records += 1;
                        valid_end = record_end;
                        continue;
                    }
                },
            };

            // Skipped corrupt records between two events of a segment stay
            // accounted to that segment.
            let segment_end = segments.get(key).map_or(offset, |s| s.end());
            segments.append_event(key, record_end - segment_end)?;
            summary.events += 1;
            valid_end = record_end;
        }
        summary.skipped_corrupt = reader.skipped();

        if reader.skipped() > 0 {
            log_event_with_fields(
                Event::ReplaySkipCorrupt,
                &[("records", &reader.skipped().to_string())],
            );
        }
        if valid_end < stored_end {
            summary.discarded_tail = stored_end - valid_end;
            Logger::warn(
                "JOURNAL_TAIL_DISCARDED",
                &[
                    ("valid_end", &valid_end.to_string()),
                    ("stored_end", &stored_end.to_string()),
                    ("torn", &reader.torn_tail().to_string()),
                ],
            );
            self.ctx.backend.discard_tail(valid_end)?;
        }

        self.reset(start);
        self.positions.advance_write(valid_end - start);
        self.positions.advance_safe(valid_end);
        self.pending = super::submit::PendingBatch::new(valid_end);
        self.segments = segments;
        self.events_since_major = events_since_major;
        self.num_replayed_segments = summary.segments;
        self.replay_summary = Some(summary);
        Ok(summary)
    }
}
