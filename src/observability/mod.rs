//! Observability for the journal
//!
//! - Structured logging (JSON lines)
//! - Typed lifecycle events
//! - Monotonic counters
//!
//! Observability is read-only: nothing here feeds back into journal
//! decisions, and a failing log sink never fails a journal operation.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Severity a lifecycle event is logged at
pub fn event_severity(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_warning() {
        Severity::Warn
    } else if event.is_trace() {
        Severity::Trace
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(event_severity(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event_severity(event), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_severity_mapping() {
        assert_eq!(event_severity(Event::WriteFailed), Severity::Fatal);
        assert_eq!(event_severity(Event::LargeEventDropped), Severity::Warn);
        assert_eq!(event_severity(Event::Flush), Severity::Trace);
        assert_eq!(event_severity(Event::SegmentTrimmed), Severity::Info);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event(Event::JournalCreate);
        log_event_with_fields(Event::SegmentOpen, &[("seq", "1"), ("offset", "0")]);
    }
}
