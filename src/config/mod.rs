//! Live configuration for the journal
//!
//! Configuration values live in a [`ConfigStore`] as strings keyed by option
//! name, the way an operator sets them at runtime. The journal never reads
//! the store directly on its hot path: `handle_conf_change` turns the
//! recognized keys into an immutable [`RetentionPolicy`] snapshot which the
//! journal swaps in under the owning lock.

mod policy;

pub use policy::{LargeEventAction, PolicyUpdate, RetentionPolicy};

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::mdlog::{MdLogError, MdLogResult};

/// Option names recognized by the journal.
pub mod keys {
    pub const MAX_EVENTS: &str = "mds_log_max_events";
    pub const MAX_SEGMENTS: &str = "mds_log_max_segments";
    pub const EVENTS_PER_SEGMENT: &str = "mds_log_events_per_segment";
    pub const MAJOR_SEGMENT_EVENT_RATIO: &str = "mds_log_major_segment_event_ratio";
    pub const EVENT_LARGE_THRESHOLD: &str = "mds_log_event_large_threshold";
    pub const SKIP_CORRUPT_EVENTS: &str = "mds_log_skip_corrupt_events";
    pub const SKIP_UNBOUNDED_EVENTS: &str = "mds_log_skip_unbounded_events";
    pub const LARGE_EVENT_ACTION: &str = "mds_log_large_event_action";
    pub const DEBUG_ZOMBIE_LOG_SEGMENTS: &str = "mds_debug_zombie_log_segments";

    /// Every key the retention policy is derived from.
    pub const ALL: &[&str] = &[
        MAX_EVENTS,
        MAX_SEGMENTS,
        EVENTS_PER_SEGMENT,
        MAJOR_SEGMENT_EVENT_RATIO,
        EVENT_LARGE_THRESHOLD,
        SKIP_CORRUPT_EVENTS,
        SKIP_UNBOUNDED_EVENTS,
        LARGE_EVENT_ACTION,
        DEBUG_ZOMBIE_LOG_SEGMENTS,
    ];
}

/// Cluster map snapshot passed along with configuration changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterMap {
    /// Map epoch; bumped by the owner on every change.
    pub epoch: u64,
}

impl ClusterMap {
    /// The next epoch.
    pub fn next(&self) -> Self {
        Self {
            epoch: self.epoch + 1,
        }
    }
}

/// Runtime key/value configuration.
///
/// Values are stored as strings and parsed by whoever consumes them, so a
/// malformed value only affects the key it was set on.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl ConfigStore {
    /// Create an empty store. Unset keys fall back to policy defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn set_val(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    /// Remove a value, restoring the default on the next change.
    pub fn rm_val(&self, key: &str) {
        self.values.write().remove(key);
    }

    /// Get a value.
    pub fn get_val(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Every key currently set.
    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Load a flat JSON object of option names to values.
    ///
    /// Numbers and booleans are accepted as-is and stored in string form.
    /// Returns the keys that were set.
    pub fn load_json_file(&self, path: &Path) -> MdLogResult<Vec<String>> {
        let content = fs::read_to_string(path).map_err(|e| {
            MdLogError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        self.load_json_str(&content)
    }

    /// Load a flat JSON object from a string.
    pub fn load_json_str(&self, content: &str) -> MdLogResult<Vec<String>> {
        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| MdLogError::Config(format!("invalid config JSON: {}", e)))?;
        let object = parsed
            .as_object()
            .ok_or_else(|| MdLogError::Config("config must be a JSON object".to_string()))?;

        let mut changed = Vec::with_capacity(object.len());
        for (key, value) in object {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(MdLogError::Config(format!(
                        "unsupported value for {}: {}",
                        key, other
                    )))
                }
            };
            self.set_val(key.clone(), text);
            changed.push(key.clone());
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_rm() {
        let conf = ConfigStore::new();
        assert!(conf.get_val(keys::MAX_SEGMENTS).is_none());

        conf.set_val(keys::MAX_SEGMENTS, "8");
        assert_eq!(conf.get_val(keys::MAX_SEGMENTS).as_deref(), Some("8"));

        conf.rm_val(keys::MAX_SEGMENTS);
        assert!(conf.get_val(keys::MAX_SEGMENTS).is_none());
    }

    #[test]
    fn test_load_json_mixed_types() {
        let conf = ConfigStore::new();
        let changed = conf
            .load_json_str(
                r#"{"mds_log_max_segments": 4, "mds_log_skip_unbounded_events": true,
                    "mds_log_large_event_action": "reject"}"#,
            )
            .unwrap();

        assert_eq!(changed.len(), 3);
        assert_eq!(conf.get_val(keys::MAX_SEGMENTS).as_deref(), Some("4"));
        assert_eq!(conf.get_val(keys::SKIP_UNBOUNDED_EVENTS).as_deref(), Some("true"));
        assert_eq!(conf.get_val(keys::LARGE_EVENT_ACTION).as_deref(), Some("reject"));
    }

    #[test]
    fn test_load_json_rejects_non_object() {
        let conf = ConfigStore::new();
        assert!(conf.load_json_str("[1, 2]").is_err());
        assert!(conf.load_json_str(r#"{"a": [1]}"#).is_err());
    }
}
