//! Normalized events.

use crate::catalog::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use toolbar_core::EventId;

/// An event produced by a notification adapter.
///
/// Immutable once built; the dispatcher shares it between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub payload: JsonValue,
    /// Identifier of the emitting adapter or plugin.
    #[serde(default)]
    pub source: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Event {
    #[must_use]
    pub fn new(event_type: EventType, payload: JsonValue, source: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            event_type,
            payload,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Value at a dot-separated path in the payload.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<&JsonValue> {
        lookup_path(&self.payload, path)
    }
}

/// Resolve a dot-separated path against a JSON value.
///
/// Object keys are matched exactly; a segment that parses as an integer
/// indexes into an array. JSON `null` counts as absent.
#[must_use]
pub fn lookup_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return None;
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookup_nested_and_indexed() {
        let payload = json!({
            "pull_request": { "number": 7, "labels": [{ "name": "docs" }] },
            "closed_at": null
        });
        assert_eq!(lookup_path(&payload, "pull_request.number"), Some(&json!(7)));
        assert_eq!(
            lookup_path(&payload, "pull_request.labels.0.name"),
            Some(&json!("docs"))
        );
        assert_eq!(lookup_path(&payload, "pull_request.labels.3.name"), None);
        assert_eq!(lookup_path(&payload, "pull_request.number.value"), None);
        assert_eq!(lookup_path(&payload, "closed_at"), None);
        assert_eq!(lookup_path(&payload, ""), None);
    }

    #[test]
    fn event_wire_format() {
        let event: Event = serde_json::from_value(json!({
            "type": "github_pr_created",
            "payload": { "files": ["README.md"] },
            "source": "github-events"
        }))
        .expect("parse");
        assert_eq!(event.event_type, EventType::GithubPrCreated);
        assert_eq!(event.field("files.0"), Some(&json!("README.md")));
    }
}
