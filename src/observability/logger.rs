//! Structured JSON logger
//!
//! One line per event on stdout (stderr for ERROR and FATAL). Every line
//! starts with `event`, `severity`, `ts` and `thread`; caller fields follow
//! sorted by key so lines from the submitter, the finisher and the journal
//! writer diff cleanly.

use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Journal consistency lost
    Fatal = 4,
}

impl Severity {
    const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

/// Where a line was produced.
struct Origin {
    ts: String,
    thread: String,
}

impl Origin {
    fn current() -> Self {
        let current = thread::current();
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            thread: current.name().unwrap_or("unnamed").to_string(),
        }
    }
}

/// Process-wide structured logger.
pub struct Logger;

impl Logger {
    /// Discard lines below `severity`.
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        let raw = MIN_SEVERITY.load(Ordering::Relaxed) as usize;
        Severity::ALL[raw.min(Severity::ALL.len() - 1)]
    }

    pub fn enabled(severity: Severity) -> bool {
        severity >= Self::min_severity()
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if !Self::enabled(severity) {
            return;
        }
        let line = render(severity, event, &Origin::current(), fields);
        // A failing sink never fails the journal.
        let _ = if severity >= Severity::Error {
            io::stderr().lock().write_all(line.as_bytes())
        } else {
            io::stdout().lock().write_all(line.as_bytes())
        };
    }

    pub fn trace(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Trace, event, fields);
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }

    pub fn error(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Error, event, fields);
    }
}

fn render(severity: Severity, event: &str, origin: &Origin, fields: &[(&str, &str)]) -> String {
    let quote = |s: &str| Value::String(s.to_string()).to_string();

    // Map iterates in key order.
    let sorted: Map<String, Value> = fields
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
        .collect();

    let mut line = format!(
        "{{\"event\":{},\"severity\":\"{}\",\"ts\":{},\"thread\":{}",
        quote(event),
        severity,
        quote(&origin.ts),
        quote(&origin.thread),
    );
    for (key, value) in &sorted {
        line.push(',');
        line.push_str(&quote(key));
        line.push(':');
        line.push_str(&value.to_string());
    }
    line.push_str("}\n");
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_origin() -> Origin {
        Origin {
            ts: "2024-01-01T00:00:00.000Z".to_string(),
            thread: "mdlog-finisher".to_string(),
        }
    }

    #[test]
    fn test_line_header() {
        let line = render(Severity::Info, "SEGMENT_OPEN", &fixed_origin(), &[("seq", "3")]);

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["event"], "SEGMENT_OPEN");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["thread"], "mdlog-finisher");
        assert_eq!(parsed["seq"], "3");
        assert!(line.starts_with("{\"event\":\"SEGMENT_OPEN\",\"severity\":\"INFO\",\"ts\":"));
    }

    #[test]
    fn test_fields_sorted_by_key() {
        let origin = fixed_origin();
        let a = render(
            Severity::Warn,
            "FLUSH",
            &origin,
            &[("start", "0"), ("end", "10"), ("records", "2")],
        );
        let b = render(
            Severity::Warn,
            "FLUSH",
            &origin,
            &[("records", "2"), ("start", "0"), ("end", "10")],
        );
        assert_eq!(a, b);
        assert!(a.find("\"end\"").unwrap() < a.find("\"records\"").unwrap());
        assert!(a.find("\"records\"").unwrap() < a.find("\"start\"").unwrap());
    }

    #[test]
    fn test_values_are_escaped() {
        let line = render(Severity::Error, "X", &fixed_origin(), &[("error", "bad \"len\"\nhere")]);

        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["error"], "bad \"len\"\nhere");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_min_severity_filter() {
        let previous = Logger::min_severity();
        Logger::set_min_severity(Severity::Error);
        assert!(!Logger::enabled(Severity::Warn));
        assert!(Logger::enabled(Severity::Fatal));
        Logger::set_min_severity(previous);
        assert_eq!(Logger::min_severity(), previous);
    }
}
