//! Journal counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; values are exact once the journal is quiescent

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of journal counters
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    events_submitted: AtomicU64,
    bytes_submitted: AtomicU64,
    segments_opened: AtomicU64,
    flushes: AtomicU64,
    bytes_safe: AtomicU64,
    write_failures: AtomicU64,
    segments_expiring: AtomicU64,
    segments_expired: AtomicU64,
    segments_trimmed: AtomicU64,
    large_events_dropped: AtomicU64,
    large_events_rejected: AtomicU64,
    config_changes: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events_submitted: u64,
    pub bytes_submitted: u64,
    pub segments_opened: u64,
    pub flushes: u64,
    pub bytes_safe: u64,
    pub write_failures: u64,
    pub segments_expiring: u64,
    pub segments_expired: u64,
    pub segments_trimmed: u64,
    pub large_events_dropped: u64,
    pub large_events_rejected: u64,
    pub config_changes: u64,
}

impl MetricsRegistry {
    /// Create a new registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted event of `bytes` serialized bytes
    pub fn record_submit(&self, bytes: u64) {
        self.events_submitted.fetch_add(1, Ordering::Relaxed);
        self.bytes_submitted.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_segments_opened(&self) {
        self.segments_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_flushes(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes acknowledged durable
    pub fn add_bytes_safe(&self, bytes: u64) {
        self.bytes_safe.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn increment_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_segments_expiring(&self) {
        self.segments_expiring.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_segments_expired(&self) {
        self.segments_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_segments_trimmed(&self) {
        self.segments_trimmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_large_events_dropped(&self) {
        self.large_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_large_events_rejected(&self) {
        self.large_events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_config_changes(&self) {
        self.config_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_submitted: self.events_submitted.load(Ordering::Relaxed),
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            segments_opened: self.segments_opened.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes_safe: self.bytes_safe.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            segments_expiring: self.segments_expiring.load(Ordering::Relaxed),
            segments_expired: self.segments_expired.load(Ordering::Relaxed),
            segments_trimmed: self.segments_trimmed.load(Ordering::Relaxed),
            large_events_dropped: self.large_events_dropped.load(Ordering::Relaxed),
            large_events_rejected: self.large_events_rejected.load(Ordering::Relaxed),
            config_changes: self.config_changes.load(Ordering::Relaxed),
        }
    }

    /// Current counters as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}
