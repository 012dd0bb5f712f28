//! Retention policy snapshot
//!
//! A `RetentionPolicy` is immutable once built. Reconfiguration builds a new
//! snapshot from the previous one plus the changed keys; a trim scan that is
//! already running keeps the `Arc` it started with.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::{keys, ConfigStore};

/// What to do with an oversized event when skipping is disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LargeEventAction {
    /// Accept the event and log a warning.
    Warn,
    /// Fail the submission.
    Reject,
}

impl FromStr for LargeEventAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(LargeEventAction::Warn),
            "reject" => Ok(LargeEventAction::Reject),
            other => Err(format!("expected warn or reject, got {:?}", other)),
        }
    }
}

impl fmt::Display for LargeEventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LargeEventAction::Warn => write!(f, "warn"),
            LargeEventAction::Reject => write!(f, "reject"),
        }
    }
}

/// Thresholds governing segmentation, retention and event size handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionPolicy {
    /// Maximum live events before periodic trim expires segments; -1 = unbounded.
    pub max_events: i64,
    /// Maximum live segments before periodic trim expires segments.
    pub max_segments: u64,
    /// Events in one segment before a minor boundary is started.
    pub events_per_segment: u64,
    /// Segments' worth of events between major boundaries.
    pub major_segment_event_ratio: u64,
    /// Serialized size above which an event is considered unbounded.
    pub event_large_threshold: u64,
    /// Resynchronize past corrupt records during replay.
    pub skip_corrupt_events: bool,
    /// Drop oversized events instead of applying `large_event_action`.
    pub skip_unbounded_events: bool,
    /// Handling of oversized events when not skipped.
    pub large_event_action: LargeEventAction,
    /// Retain unreferenced segments instead of expiring them.
    pub debug_zombie_log_segments: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_events: -1,
            max_segments: 128,
            events_per_segment: 1024,
            major_segment_event_ratio: 12,
            event_large_threshold: 512 * 1024,
            skip_corrupt_events: false,
            skip_unbounded_events: false,
            large_event_action: LargeEventAction::Warn,
            debug_zombie_log_segments: false,
        }
    }
}

/// Outcome of applying changed keys to a policy.
#[derive(Debug, Clone)]
pub struct PolicyUpdate {
    /// The new snapshot.
    pub policy: RetentionPolicy,
    /// Recognized keys whose value was applied.
    pub applied: Vec<String>,
    /// Recognized keys whose value was malformed, with the reason.
    pub rejected: Vec<(String, String)>,
}

impl PolicyUpdate {
    /// Whether the snapshot differs from the one it was derived from.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got {:?}", other)),
    }
}

fn parse_num<T: FromStr>(value: &str) -> Result<T, String>
where
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| e.to_string())
}

fn parse_positive(value: &str) -> Result<u64, String> {
    match parse_num::<u64>(value)? {
        0 => Err("must be greater than zero".to_string()),
        n => Ok(n),
    }
}

impl RetentionPolicy {
    /// Derive a new snapshot for `changed_keys`.
    ///
    /// Keys the policy does not recognize are ignored. A recognized key
    /// whose value is missing from the store reverts to its default; a
    /// malformed value is reported and leaves the previous value in place.
    pub fn apply_changes<S: AsRef<str>>(&self, changed_keys: &[S], conf: &ConfigStore) -> PolicyUpdate {
        let defaults = RetentionPolicy::default();
        let mut next = self.clone();
        let mut applied = Vec::new();
        let mut rejected = Vec::new();

        for key in changed_keys {
            let key = key.as_ref();
            if !keys::ALL.contains(&key) {
                continue;
            }
            let raw = conf.get_val(key);
            let result = match key {
                keys::MAX_EVENTS => match raw {
                    None => {
                        next.max_events = defaults.max_events;
                        Ok(())
                    }
                    Some(v) => parse_num::<i64>(&v).and_then(|n| {
                        if n < -1 {
                            Err("must be -1 or non-negative".to_string())
                        } else {
                            next.max_events = n;
                            Ok(())
                        }
                    }),
                },
                keys::MAX_SEGMENTS => match raw {
                    None => {
                        next.max_segments = defaults.max_segments;
                        Ok(())
                    }
                    Some(v) => parse_positive(&v).map(|n| next.max_segments = n),
                },
                keys::EVENTS_PER_SEGMENT => match raw {
                    None => {
                        next.events_per_segment = defaults.events_per_segment;
                        Ok(())
                    }
                    Some(v) => parse_positive(&v).map(|n| next.events_per_segment = n),
                },
                keys::MAJOR_SEGMENT_EVENT_RATIO => match raw {
                    None => {
                        next.major_segment_event_ratio = defaults.major_segment_event_ratio;
                        Ok(())
                    }
                    Some(v) => parse_positive(&v).map(|n| next.major_segment_event_ratio = n),
                },
                keys::EVENT_LARGE_THRESHOLD => match raw {
                    None => {
                        next.event_large_threshold = defaults.event_large_threshold;
                        Ok(())
                    }
                    Some(v) => parse_positive(&v).map(|n| next.event_large_threshold = n),
                },
                keys::SKIP_CORRUPT_EVENTS => match raw {
                    None => {
                        next.skip_corrupt_events = defaults.skip_corrupt_events;
                        Ok(())
                    }
                    Some(v) => parse_bool(&v).map(|b| next.skip_corrupt_events = b),
                },
                keys::SKIP_UNBOUNDED_EVENTS => match raw {
                    None => {
                        next.skip_unbounded_events = defaults.skip_unbounded_events;
                        Ok(())
                    }
                    Some(v) => parse_bool(&v).map(|b| next.skip_unbounded_events = b),
                },
                keys::LARGE_EVENT_ACTION => match raw {
                    None => {
                        next.large_event_action = defaults.large_event_action;
                        Ok(())
                    }
                    Some(v) => v.parse::<LargeEventAction>().map(|a| next.large_event_action = a),
                },
                keys::DEBUG_ZOMBIE_LOG_SEGMENTS => match raw {
                    None => {
                        next.debug_zombie_log_segments = defaults.debug_zombie_log_segments;
                        Ok(())
                    }
                    Some(v) => parse_bool(&v).map(|b| next.debug_zombie_log_segments = b),
                },
                _ => continue,
            };

            match result {
                Ok(()) => applied.push(key.to_string()),
                Err(reason) => rejected.push((key.to_string(), reason)),
            }
        }

        PolicyUpdate {
            policy: next,
            applied,
            rejected,
        }
    }

    /// Events since the last major boundary that trigger a new major boundary.
    pub fn major_boundary_events(&self) -> u64 {
        self.events_per_segment
            .saturating_mul(self.major_segment_event_ratio)
    }

    /// Whether `live_events` exceeds `max_events`.
    pub fn events_over_limit(&self, live_events: u64) -> bool {
        self.max_events >= 0 && live_events > self.max_events as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.max_events, -1);
        assert_eq!(policy.max_segments, 128);
        assert_eq!(policy.events_per_segment, 1024);
        assert_eq!(policy.major_boundary_events(), 1024 * 12);
        assert!(!policy.events_over_limit(u64::MAX));
        assert!(!policy.debug_zombie_log_segments);
    }

    #[test]
    fn test_apply_recognized_keys() {
        let conf = ConfigStore::new();
        conf.set_val(keys::MAX_SEGMENTS, "3");
        conf.set_val(keys::MAX_EVENTS, "100");
        conf.set_val(keys::DEBUG_ZOMBIE_LOG_SEGMENTS, "true");

        let update = RetentionPolicy::default().apply_changes(
            &[keys::MAX_SEGMENTS, keys::MAX_EVENTS, keys::DEBUG_ZOMBIE_LOG_SEGMENTS],
            &conf,
        );

        assert_eq!(update.applied.len(), 3);
        assert!(update.rejected.is_empty());
        assert_eq!(update.policy.max_segments, 3);
        assert!(update.policy.events_over_limit(101));
        assert!(update.policy.debug_zombie_log_segments);
    }

    #[test]
    fn test_unrecognized_keys_ignored() {
        let conf = ConfigStore::new();
        conf.set_val("mds_debug_subtrees", "true");

        let update = RetentionPolicy::default().apply_changes(&["mds_debug_subtrees"], &conf);

        assert!(update.is_empty());
        assert!(update.rejected.is_empty());
        assert_eq!(update.policy, RetentionPolicy::default());
    }

    #[test]
    fn test_malformed_value_keeps_previous() {
        let conf = ConfigStore::new();
        conf.set_val(keys::MAX_SEGMENTS, "lots");
        conf.set_val(keys::EVENTS_PER_SEGMENT, "0");
        conf.set_val(keys::EVENT_LARGE_THRESHOLD, "4096");

        let mut base = RetentionPolicy::default();
        base.max_segments = 7;
        let update = base.apply_changes(
            &[keys::MAX_SEGMENTS, keys::EVENTS_PER_SEGMENT, keys::EVENT_LARGE_THRESHOLD],
            &conf,
        );

        assert_eq!(update.rejected.len(), 2);
        assert_eq!(update.policy.max_segments, 7);
        assert_eq!(update.policy.events_per_segment, 1024);
        assert_eq!(update.policy.event_large_threshold, 4096);
    }

    #[test]
    fn test_unset_key_reverts_to_default() {
        let conf = ConfigStore::new();
        let mut base = RetentionPolicy::default();
        base.skip_unbounded_events = true;
        base.max_events = 5;
        base.max_segments = 3;

        let update = base.apply_changes(
            &[keys::SKIP_UNBOUNDED_EVENTS, keys::MAX_EVENTS, keys::MAX_SEGMENTS],
            &conf,
        );
        let defaults = RetentionPolicy::default();
        assert!(!update.policy.skip_unbounded_events);
        assert_eq!(update.policy.max_events, defaults.max_events);
        assert_eq!(update.policy.max_segments, defaults.max_segments);
        assert_eq!(update.applied.len(), 3);
        assert!(update.rejected.is_empty());
    }

    #[test]
    fn test_large_event_action_parse() {
        assert_eq!("Reject".parse::<LargeEventAction>(), Ok(LargeEventAction::Reject));
        assert_eq!("warn".parse::<LargeEventAction>(), Ok(LargeEventAction::Warn));
        assert!("drop".parse::<LargeEventAction>().is_err());
    }
}
