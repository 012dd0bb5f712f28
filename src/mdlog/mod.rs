//! Metadata journal core
//!
//! `MdLog` records metadata events in a segmented write-ahead journal:
//!
//! 1. `submit_entry` assigns the event an offset in the open segment and
//!    advances the write position (boundary events open a new segment)
//! 2. `flush` hands pending bytes to the backend; acknowledgements advance
//!    the safe position and fire `wait_for_safe` completions
//! 3. `trim`/`trim_all` expire closed segments the retention rules allow;
//!    expired segments are removed from the oldest end, advancing the read
//!    position
//!
//! # Locking
//!
//! The journal does no locking of its own. It lives in a [`SharedLog`]
//! (`Arc<Mutex<MdLog>>`) owned by the caller, and every mutating method takes
//! `&mut self`, so holding the guard is the proof that the owning lock is
//! held. Backend acknowledgements and expiration results arrive on other
//! threads; they are queued on the [`Finisher`], which re-acquires the lock
//! before touching journal state. Caller completions are likewise always
//! queued on the finisher, never run on the caller's stack.

mod durability;
mod errors;
mod event;
mod position;
mod replay;
mod segment;
mod submit;
mod trim;

pub use errors::{MdLogError, MdLogResult, Severity};
pub use event::{BoundaryKind, EventKind, LogEvent};
pub use position::Positions;
pub use replay::ReplaySummary;
pub use segment::{LogSegment, SegmentInfo, SegmentState, SegmentStore};
pub use submit::SubmitOutcome;
pub use trim::{NoopExpirer, SegmentExpirer};

use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;

use crate::completion::{Completion, Finisher, Status};
use crate::config::{keys, ClusterMap, ConfigStore, RetentionPolicy};
use crate::journal::{JournalBackend, JournalHead};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry};

use durability::SafeWaiters;
use submit::PendingBatch;

/// Journal behind its owning lock.
pub type SharedLog = Arc<Mutex<MdLog>>;

/// Supplies payloads for boundary events the journal starts on its own.
pub trait BoundarySource: Send + Sync {
    fn boundary_payload(&self, kind: BoundaryKind, segment_seq: u64) -> Vec<u8>;
}

/// Boundary payload that records only the marker's kind, sequence and time.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerBoundarySource;

#[derive(Serialize)]
struct BoundaryMarker {
    kind: BoundaryKind,
    segment_seq: u64,
    created_at: chrono::DateTime<Utc>,
}

impl BoundarySource for MarkerBoundarySource {
    fn boundary_payload(&self, kind: BoundaryKind, segment_seq: u64) -> Vec<u8> {
        let marker = BoundaryMarker {
            kind,
            segment_seq,
            created_at: Utc::now(),
        };
        serde_json::to_vec(&marker).unwrap_or_default()
    }
}

/// Collaborators the journal is built with.
#[derive(Clone)]
pub struct LogContext {
    pub finisher: Finisher,
    pub backend: Arc<dyn JournalBackend>,
    pub config: Arc<ConfigStore>,
    pub metrics: Arc<MetricsRegistry>,
    pub expirer: Arc<dyn SegmentExpirer>,
    pub boundary_source: Arc<dyn BoundarySource>,
}

impl LogContext {
    /// Context with an empty config store, fresh metrics, no-op expiration
    /// and marker boundaries.
    pub fn new(finisher: Finisher, backend: Arc<dyn JournalBackend>) -> Self {
        Self {
            finisher,
            backend,
            config: Arc::new(ConfigStore::new()),
            metrics: Arc::new(MetricsRegistry::new()),
            expirer: Arc::new(NoopExpirer),
            boundary_source: Arc::new(MarkerBoundarySource),
        }
    }

    pub fn with_config(mut self, config: Arc<ConfigStore>) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_expirer(mut self, expirer: Arc<dyn SegmentExpirer>) -> Self {
        self.expirer = expirer;
        self
    }

    pub fn with_boundary_source(mut self, source: Arc<dyn BoundarySource>) -> Self {
        self.boundary_source = source;
        self
    }
}

/// Journal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogState {
    /// Constructed; waiting for `create` or `open`
    Idle,
    /// Accepting events
    Active,
    /// Shut down
    Stopped,
}

/// The segmented metadata journal.
pub struct MdLog {
    this: Weak<Mutex<MdLog>>,
    ctx: LogContext,
    state: LogState,
    policy: Arc<RetentionPolicy>,
    positions: Positions,
    segments: SegmentStore,
    pending: PendingBatch,
    safe_waiters: SafeWaiters,
    /// Status of the first failed backend write.
    failure: Option<Status>,
    /// Regular events since the last major boundary.
    events_since_major: u64,
    num_replayed_segments: usize,
    replay_summary: Option<ReplaySummary>,
}

impl MdLog {
    /// Build a journal behind its owning lock. The retention policy is
    /// derived from whatever `ctx.config` holds now.
    pub fn new(ctx: LogContext) -> SharedLog {
        let update = RetentionPolicy::default().apply_changes(keys::ALL, &ctx.config);
        for (key, reason) in &update.rejected {
            log_event_with_fields(Event::ConfigRejected, &[("key", key.as_str()), ("reason", reason.as_str())]);
        }

        Arc::new_cyclic(|this| {
            Mutex::new(MdLog {
                this: this.clone(),
                ctx,
                state: LogState::Idle,
                policy: Arc::new(update.policy),
                positions: Positions::new(0),
                segments: SegmentStore::new(),
                pending: PendingBatch::new(0),
                safe_waiters: SafeWaiters::new(),
                failure: None,
                events_since_major: 0,
                num_replayed_segments: 0,
                replay_summary: None,
            })
        })
    }

    /// Wrap `f` so that calling the result from any thread queues `f` on the
    /// finisher, where it runs with the owning lock held. Dropped silently
    /// if the journal itself has been dropped.
    fn deferred<T, F>(&self, f: F) -> impl FnOnce(T) + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce(&mut MdLog, T) + Send + 'static,
    {
        let this = self.this.clone();
        let finisher = self.ctx.finisher.clone();
        move |value| {
            finisher.queue_fn(move || {
                if let Some(log) = this.upgrade() {
                    f(&mut *log.lock(), value);
                }
            })
        }
    }

    /// Queue a caller completion.
    fn complete_later(&self, completion: Completion, status: Status) {
        self.ctx.finisher.queue(completion, status);
    }

    fn ensure_active(&self, op: &str) -> MdLogResult<()> {
        match self.state {
            LogState::Active => Ok(()),
            state => Err(MdLogError::invalid_state(format!(
                "{} requires an active journal, journal is {:?}",
                op, state
            ))),
        }
    }

    /// Reset to an empty journal at `start`.
    fn reset(&mut self, start: u64) {
        self.positions = Positions::new(start);
        self.segments = SegmentStore::new();
        self.pending = PendingBatch::new(start);
        self.safe_waiters = SafeWaiters::new();
        self.failure = None;
        self.events_since_major = 0;
        self.num_replayed_segments = 0;
    }

    /// Initialize an empty journal. `on_ready` receives the status.
    pub fn create(&mut self, on_ready: Completion) {
        if self.state != LogState::Idle {
            Logger::warn(
                "JOURNAL_CREATE_REJECTED",
                &[("state", &format!("{:?}", self.state))],
            );
            self.complete_later(on_ready, Status::EINVAL);
            return;
        }

        let head = JournalHead::new(0);
        match self.ctx.backend.create(&head) {
            Ok(()) => {
                self.reset(head.expire_pos);
                self.state = LogState::Active;
                log_event_with_fields(
                    Event::JournalCreate,
                    &[("journal_id", &head.journal_id.to_string())],
                );
                self.complete_later(on_ready, Status::OK);
            }
            Err(e) => {
                Logger::error(
                    "JOURNAL_CREATE_FAILED",
                    &[("code", e.code()), ("error", &e.to_string())],
                );
                self.complete_later(on_ready, e.status());
            }
        }
    }

    /// Stop the journal.
    ///
    /// Drains the backend writer, then cancels outstanding safe and expiry
    /// waiters with `ECANCELED`. Bytes not yet flushed are discarded.
    /// Acknowledgements still queued on the finisher find the journal
    /// stopped and are ignored.
    pub fn shutdown(&mut self) {
        if self.state == LogState::Stopped {
            return;
        }

        if !self.pending.is_empty() {
            Logger::warn(
                "JOURNAL_SHUTDOWN_UNFLUSHED",
                &[("bytes", &self.pending.len().to_string())],
            );
        }
        self.ctx.backend.shutdown();
        self.state = LogState::Stopped;

        self.safe_waiters
            .fail_all(&self.ctx.finisher, Status::ECANCELED);
        for segment in self.segments.segments_mut() {
            for waiter in segment.expiry_waiters.drain(..) {
                self.ctx.finisher.queue(waiter, Status::ECANCELED);
            }
        }

        log_event_with_fields(
            Event::JournalShutdown,
            &[
                ("write_pos", &self.positions.write().to_string()),
                ("safe_pos", &self.positions.safe().to_string()),
                ("read_pos", &self.positions.read().to_string()),
            ],
        );
    }

    /// Recompute the retention policy for `changed_keys`.
    ///
    /// Unrecognized keys are ignored and malformed values keep their previous
    /// setting. Scans already in progress keep the snapshot they started with.
    pub fn handle_conf_change<S: AsRef<str>>(&mut self, changed_keys: &[S], map: &ClusterMap) {
        let update = self.policy.apply_changes(changed_keys, &self.ctx.config);

        for (key, reason) in &update.rejected {
            log_event_with_fields(Event::ConfigRejected, &[("key", key.as_str()), ("reason", reason.as_str())]);
        }
        if update.is_empty() {
            return;
        }

        log_event_with_fields(
            Event::ConfigChanged,
            &[
                ("keys", &update.applied.join(",")),
                ("epoch", &map.epoch.to_string()),
            ],
        );
        self.ctx.metrics.increment_config_changes();
        self.policy = Arc::new(update.policy);
    }

    /// Active retention policy snapshot.
    pub fn policy(&self) -> Arc<RetentionPolicy> {
        Arc::clone(&self.policy)
    }

    pub fn state(&self) -> LogState {
        self.state
    }

    /// Status of the write failure that made the journal read-only.
    pub fn failure(&self) -> Option<Status> {
        self.failure
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.ctx.metrics
    }

    /// Persisted journal head.
    pub fn head(&self) -> Option<JournalHead> {
        self.ctx.backend.head()
    }

    pub fn get_num_events(&self) -> u64 {
        self.segments.num_events()
    }

    pub fn get_num_segments(&self) -> usize {
        self.segments.num_segments()
    }

    pub fn empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn have_any_segments(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Details of the last `open`.
    pub fn replay_summary(&self) -> Option<ReplaySummary> {
        self.replay_summary
    }

    /// Segments rebuilt by the last `open`.
    pub fn get_num_replayed_segments(&self) -> usize {
        self.num_replayed_segments
    }

    pub fn get_write_pos(&self) -> u64 {
        self.positions.write()
    }

    pub fn get_read_pos(&self) -> u64 {
        self.positions.read()
    }

    pub fn get_safe_pos(&self) -> u64 {
        self.positions.safe()
    }

    pub fn positions(&self) -> Positions {
        self.positions
    }

    /// Snapshot of every segment, oldest first.
    pub fn segment_infos(&self) -> Vec<SegmentInfo> {
        self.segments.segments().map(LogSegment::info).collect()
    }

    /// Segments retained by zombie debugging.
    pub fn zombie_segments(&self) -> Vec<SegmentInfo> {
        self.segments
            .segments()
            .filter(|s| s.is_zombie())
            .map(LogSegment::info)
            .collect()
    }
}

impl std::fmt::Debug for MdLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdLog")
            .field("state", &self.state)
            .field("positions", &self.positions)
            .field("segments", &self.segments.num_segments())
            .field("events", &self.segments.num_events())
            .field("failure", &self.failure)
            .finish()
    }
}
