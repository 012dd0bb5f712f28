//! Durability coordinator
//!
//! `flush` hands the pending batch to the backend and returns at once. The
//! backend acknowledges batches in order; each acknowledgement is routed
//! through the finisher, re-acquires the owning lock, advances the safe
//! position and releases every waiter whose target it covers.
//!
//! A failed append is fatal to the journal's durability guarantee: the
//! journal remembers the failure, fails every pending and future waiter with
//! it and refuses further submissions.

use std::collections::VecDeque;

use super::MdLog;
use crate::completion::{Completion, Finisher, Status};
use crate::journal::JournalResult;
use crate::observability::{log_event_with_fields, Event, Logger};

use super::LogState;

/// Completions waiting for the safe position to reach their target.
///
/// Targets are the write position at registration time, which never
/// decreases, so the queue is sorted and waiters are released from the
/// front in registration order.
#[derive(Debug, Default)]
pub(crate) struct SafeWaiters {
    waiters: VecDeque<(u64, Completion)>,
}

impl SafeWaiters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, target: u64, completion: Completion) {
        debug_assert!(
            self.waiters.back().map_or(true, |(t, _)| *t <= target),
            "safe waiter targets must not decrease"
        );
        self.waiters.push_back((target, completion));
    }

    /// Queue every waiter with a target at or below `safe`.
    pub(crate) fn release_up_to(&mut self, finisher: &Finisher, safe: u64) -> usize {
        let mut released = 0;
        while self.waiters.front().map_or(false, |(target, _)| *target <= safe) {
            if let Some((_, completion)) = self.waiters.pop_front() {
                finisher.queue(completion, Status::OK);
                released += 1;
            }
        }
        released
    }

    /// Queue every waiter with `status`.
    pub(crate) fn fail_all(&mut self, finisher: &Finisher, status: Status) {
        for (_, completion) in self.waiters.drain(..) {
            finisher.queue(completion, status);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

impl MdLog {
    /// Hand pending events to the backend.
    ///
    /// Returns immediately. Calling it with nothing pending is a no-op.
    pub fn flush(&mut self) {
        if self.state != LogState::Active || self.pending.is_empty() {
            return;
        }

        let batch = self.pending.take();
        log_event_with_fields(
            Event::Flush,
            &[
                ("start", &batch.start().to_string()),
                ("end", &batch.end().to_string()),
                ("records", &batch.records().to_string()),
            ],
        );
        self.ctx.metrics.increment_flushes();

        let on_ack = self.deferred(|log: &mut MdLog, result: JournalResult<u64>| {
            log.handle_append_ack(result)
        });
        self.ctx.backend.append(batch, Box::new(on_ack));
    }

    /// Fire `on_safe` once everything submitted so far is durable.
    ///
    /// The target is the write position now. If it is already safe the
    /// completion is still queued rather than run inline. After a write
    /// failure it fires with the failure status.
    pub fn wait_for_safe(&mut self, on_safe: Completion) {
        if let Some(status) = self.failure {
            self.complete_later(on_safe, status);
            return;
        }
        match self.state {
            LogState::Active => {}
            LogState::Idle => {
                self.complete_later(on_safe, Status::EINVAL);
                return;
            }
            LogState::Stopped => {
                self.complete_later(on_safe, Status::ECANCELED);
                return;
            }
        }

        let target = self.positions.write();
        if self.positions.safe() >= target {
            self.complete_later(on_safe, Status::OK);
        } else {
            self.safe_waiters.push(target, on_safe);
        }
    }

    /// Number of registered safe waiters.
    pub fn num_safe_waiters(&self) -> usize {
        self.safe_waiters.len()
    }

    fn handle_append_ack(&mut self, result: JournalResult<u64>) {
        if self.state != LogState::Active {
            return;
        }

        match result {
            Ok(end) => {
                let previous = self.positions.safe();
                self.positions.advance_safe(end);
                self.ctx.metrics.add_bytes_safe(end - previous);
                self.safe_waiters.release_up_to(&self.ctx.finisher, end);
            }
            Err(e) => {
                let status = e.status();
                if self.failure.is_none() {
                    self.failure = Some(status);
                    self.ctx.metrics.increment_write_failures();
                    log_event_with_fields(
                        Event::WriteFailed,
                        &[
                            ("code", e.code()),
                            ("error", &e.to_string()),
                            ("safe_pos", &self.positions.safe().to_string()),
                        ],
                    );
                } else {
                    Logger::trace("JOURNAL_APPEND_FAILED_AFTER_FAILURE", &[("code", e.code())]);
                }
                self.safe_waiters.fail_all(&self.ctx.finisher, status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionSignal;
    use std::time::Duration;

    #[test]
    fn test_release_in_target_order() {
        let finisher = Finisher::start("waiters-test");
        let mut waiters = SafeWaiters::new();
        let (a, ca) = CompletionSignal::new();
        let (b, cb) = CompletionSignal::new();
        let (c, cc) = CompletionSignal::new();
        waiters.push(10, ca);
        waiters.push(10, cb);
        waiters.push(20, cc);

        assert_eq!(waiters.release_up_to(&finisher, 15), 2);
        finisher.wait_for_empty();
        assert_eq!(a.try_status(), Some(Status::OK));
        assert_eq!(b.try_status(), Some(Status::OK));
        assert!(!c.is_fired());
        assert_eq!(waiters.len(), 1);

        waiters.fail_all(&finisher, Status::EIO);
        assert_eq!(c.wait_for(Duration::from_secs(10)), Some(Status::EIO));
        finisher.stop();
    }
}
