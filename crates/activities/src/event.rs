//! Timestamped simulation events and their shared constructors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Info,
    Warning,
    /// A physical invariant was breached and the value has already been clamped.
    Violation,
    Error,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Info => "INFO",
            EventKind::Warning => "WARNING",
            EventKind::Violation => "VIOLATION",
            EventKind::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    pub category: String,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        kind: EventKind,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            kind,
            category: category.into(),
            message: message.into(),
            details: Map::new(),
        }
    }

    /// Attach a detail entry.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }

    /// Field named by a VIOLATION, if any.
    pub fn violated_field(&self) -> Option<&str> {
        if self.kind != EventKind::Violation {
            return None;
        }
        self.details.get("field").and_then(Value::as_str)
    }
}

pub fn info(timestamp: DateTime<Utc>, category: &str, message: impl Into<String>) -> Event {
    Event::new(timestamp, EventKind::Info, category, message)
}

pub fn warning(timestamp: DateTime<Utc>, category: &str, message: impl Into<String>) -> Event {
    Event::new(timestamp, EventKind::Warning, category, message)
}

/// VIOLATION event naming the state field that was clamped.
pub fn violation(
    timestamp: DateTime<Utc>,
    category: &str,
    field: &str,
    message: impl Into<String>,
) -> Event {
    Event::new(timestamp, EventKind::Violation, category, message).with("field", field)
}

pub fn error(timestamp: DateTime<Utc>, category: &str, message: impl Into<String>) -> Event {
    Event::new(timestamp, EventKind::Error, category, message)
}

/// Event categories shared across handlers and the engine.
pub mod category {
    pub const VALIDATION: &str = "validation";
    pub const DISPATCH: &str = "dispatch";
    pub const EXCEPTION: &str = "exception";
    pub const POWER: &str = "power";
    pub const PROPELLANT: &str = "propellant";
    pub const STORAGE: &str = "storage";
    pub const THRUST: &str = "thrust";
    pub const MANEUVER: &str = "maneuver";
    pub const ACCESS: &str = "access";
    pub const PAYLOAD: &str = "payload";
    pub const COMMS: &str = "comms";
    pub const MODE: &str = "mode";
    pub const ADCS: &str = "adcs";
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_with_event_type_and_sorted_details() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let event = violation(at, category::STORAGE, "storage_used_gb", "storage full")
            .with("raw_value", 300.5)
            .with("clamped_value", 256.0);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.starts_with(r#"{"timestamp":"2025-01-01T00:00:00Z","event_type":"VIOLATION""#));
        assert!(json.contains(r#""details":{"clamped_value":256.0,"field":"storage_used_gb","raw_value":300.5}"#));
        assert_eq!(event.violated_field(), Some("storage_used_gb"));
    }

    #[test]
    fn only_violations_name_a_field() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let event = warning(at, category::POWER, "low").with("field", "battery_soc");
        assert_eq!(event.violated_field(), None);
    }
}
