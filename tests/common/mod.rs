//! Shared helpers for journal integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mdlog::completion::{Completion, GatherBuilder, Status};
use mdlog::config::ConfigStore;
use mdlog::journal::{memory_backend, JournalBackend, Journaler, MemoryDevice};
use mdlog::mdlog::{BoundaryKind, LogEvent, MdLog, SegmentExpirer, SegmentInfo};
use mdlog::rank::{Rank, DEFAULT_WAIT};
use parking_lot::Mutex;

/// Payload bytes of the filler events written by `write_segment`.
pub const FILLER_SIZE: usize = 16;

pub fn config_with(pairs: &[(&str, &str)]) -> Arc<ConfigStore> {
    let config = ConfigStore::new();
    for (key, value) in pairs {
        config.set_val(*key, *value);
    }
    Arc::new(config)
}

/// Rank over a fresh in-memory journal, already created.
pub fn created_rank(config: Arc<ConfigStore>) -> (Rank, MemoryDevice) {
    let (backend, device) = memory_backend();
    let rank = Rank::builder(backend).config(config).build();
    assert_eq!(rank.create_and_wait(DEFAULT_WAIT), Status::OK);
    (rank, device)
}

/// Same as `created_rank`, with an expiration procedure.
pub fn created_rank_with_expirer(
    config: Arc<ConfigStore>,
    expirer: Arc<dyn SegmentExpirer>,
) -> (Rank, MemoryDevice) {
    let (backend, device) = memory_backend();
    let rank = Rank::builder(backend)
        .config(config)
        .expirer(expirer)
        .build();
    assert_eq!(rank.create_and_wait(DEFAULT_WAIT), Status::OK);
    (rank, device)
}

/// Fresh rank over an existing in-memory device. Not opened yet.
pub fn reopen_rank(device: &MemoryDevice, config: Arc<ConfigStore>) -> Rank {
    let backend: Arc<dyn JournalBackend> = Arc::new(Journaler::new(device.clone()));
    Rank::builder(backend).config(config).build()
}

/// Write one segment: a boundary of `kind` plus `events - 1` filler events.
pub fn write_segment(log: &mut MdLog, kind: BoundaryKind, events: u64) {
    log.submit_entry(LogEvent::boundary(kind, format!("{}-boundary", kind)))
        .unwrap();
    for _ in 1..events {
        log.submit_entry(LogEvent::noop(FILLER_SIZE)).unwrap();
    }
}

/// Expiration procedure that holds every segment until the test releases it.
#[derive(Default)]
pub struct HookExpirer {
    disabled: AtomicBool,
    subs: Mutex<Vec<Completion>>,
    seen: Mutex<Vec<SegmentInfo>>,
}

impl HookExpirer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stop taking sub-completions; later segments expire immediately.
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }

    pub fn take_subs(&self) -> Vec<Completion> {
        std::mem::take(&mut *self.subs.lock())
    }

    pub fn seen(&self) -> Vec<SegmentInfo> {
        self.seen.lock().clone()
    }
}

impl SegmentExpirer for HookExpirer {
    fn expire(&self, segment: &SegmentInfo, gather: &mut GatherBuilder) {
        self.seen.lock().push(segment.clone());
        if !self.disabled.load(Ordering::SeqCst) {
            self.subs.lock().push(gather.new_sub());
        }
    }
}
