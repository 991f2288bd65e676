//! Observability
//!
//! Structured JSON logging of typed lifecycle events.
//!
//! ```ignore
//! use lra_coordinator::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::LraStarted, &[("lra_id", id.as_str())]);
//! ```
//!
//! Logging never fails an operation; write errors are dropped.

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = event.severity();
    if severity >= Severity::Error {
        Logger::log_stderr(severity, event.as_str(), fields);
    } else {
        Logger::log(severity, event.as_str(), fields);
    }
}
