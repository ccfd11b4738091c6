//! Notification adapters and the ingestion front door.
//!
//! An adapter turns one raw notification from an external service into a
//! normalized event, or decides the notification is not interesting. The
//! [`Ingestor`] routes notifications to adapters by source, suppresses
//! repeats through the [`Deduplicator`] and emits the survivors into an
//! [`EventSink`].

use crate::dedup::{Deduplicator, Seen};
use crate::error::AdapterError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use toolbar_core::EventId;
use toolbar_workflow::{Event, EventSink, EventType, lookup_path};
use tracing::{debug, info, warn};

/// A raw notification as received from a webhook or a poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Adapter that should handle it, e.g. `github`.
    pub source: String,
    /// Service-specific kind, e.g. GitHub's `X-GitHub-Event` value.
    pub kind: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl Notification {
    #[must_use]
    pub fn new(source: impl Into<String>, kind: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            payload,
        }
    }
}

/// What an adapter made of a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub event_type: EventType,
    pub payload: JsonValue,
    /// Identity of the underlying change, equal for webhook and poll copies.
    pub fingerprint: String,
}

/// Converts one service's notifications into events.
pub trait NotificationAdapter: Send + Sync {
    /// Source name used for routing, e.g. `github`.
    fn source(&self) -> &'static str;

    /// Name stamped on emitted events, e.g. `github-events`.
    fn emitter(&self) -> &'static str;

    /// `Ok(None)` means the notification is valid but not an event.
    ///
    /// # Errors
    ///
    /// `MissingField` when the payload lacks something the event needs.
    fn normalize(&self, notification: &Notification) -> Result<Option<Normalized>, AdapterError>;
}

/// Result of ingesting one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Emitted(EventId),
    Duplicate,
    Ignored,
}

/// Routes notifications through adapters into an event sink.
pub struct Ingestor {
    adapters: HashMap<&'static str, Arc<dyn NotificationAdapter>>,
    dedup: Deduplicator,
    sink: Arc<dyn EventSink>,
}

impl Ingestor {
    #[must_use]
    pub fn new(sink: Arc<dyn EventSink>, dedup: Deduplicator) -> Self {
        Self {
            adapters: HashMap::new(),
            dedup,
            sink,
        }
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn NotificationAdapter>) -> Self {
        self.adapters.insert(adapter.source(), adapter);
        self
    }

    /// Sources with a registered adapter.
    pub fn sources(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.adapters.keys().copied()
    }

    /// Normalizes, de-duplicates and emits one notification.
    ///
    /// # Errors
    ///
    /// `UnknownSource` without a matching adapter, `MissingField` for a
    /// malformed payload, `Emit` if the sink is closed.
    pub async fn ingest(&self, notification: Notification) -> Result<IngestOutcome, AdapterError> {
        let adapter = self.adapters.get(notification.source.as_str()).ok_or_else(|| {
            AdapterError::UnknownSource {
                source: notification.source.clone(),
            }
        })?;

        let Some(normalized) = adapter.normalize(&notification)? else {
            debug!(
                source = %notification.source,
                kind = %notification.kind,
                "Notification ignored"
            );
            return Ok(IngestOutcome::Ignored);
        };

        if let Seen::Duplicate { first_seen } = self.dedup.check_and_record(&normalized.fingerprint) {
            debug!(
                fingerprint = %normalized.fingerprint,
                first_seen = %first_seen,
                "Duplicate notification suppressed"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let violations = normalized.event_type.schema().violations(&normalized.payload);
        if !violations.is_empty() {
            warn!(
                event_type = %normalized.event_type,
                fields = ?violations,
                "Event payload does not match its schema"
            );
        }

        let event = Event::new(normalized.event_type, normalized.payload, adapter.emitter());
        let id = event.id;
        if let Err(e) = self.sink.emit(event).await {
            // Let a later copy of the same notification through.
            self.dedup.reset(&normalized.fingerprint);
            return Err(e.into());
        }
        info!(event_id = %id, event_type = %normalized.event_type, "Event emitted");
        Ok(IngestOutcome::Emitted(id))
    }
}

/// String at `path`, or `MissingField`.
pub(crate) fn required_str<'a>(
    payload: &'a JsonValue,
    path: &'static str,
    source: &'static str,
    kind: &str,
) -> Result<&'a str, AdapterError> {
    lookup_path(payload, path)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| AdapterError::MissingField {
            source,
            kind: kind.to_string(),
            field: path,
        })
}

/// Value at `path`, or `MissingField`.
pub(crate) fn required<'a>(
    payload: &'a JsonValue,
    path: &'static str,
    source: &'static str,
    kind: &str,
) -> Result<&'a JsonValue, AdapterError> {
    lookup_path(payload, path).ok_or_else(|| AdapterError::MissingField {
        source,
        kind: kind.to_string(),
        field: path,
    })
}

/// Optional value at `path`, cloned, `null` when absent.
pub(crate) fn copy(payload: &JsonValue, path: &str) -> JsonValue {
    lookup_path(payload, path).cloned().unwrap_or(JsonValue::Null)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use toolbar_workflow::DispatchError;

    /// Sink that keeps what it receives.
    #[derive(Default)]
    pub(crate) struct CollectingSink {
        pub(crate) events: Mutex<Vec<Event>>,
        pub(crate) closed: bool,
    }

    #[async_trait]
    impl EventSink for CollectingSink {
        async fn emit(&self, event: Event) -> Result<(), DispatchError> {
            if self.closed {
                return Err(DispatchError::Closed);
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct Echo;

    impl NotificationAdapter for Echo {
        fn source(&self) -> &'static str {
            "echo"
        }

        fn emitter(&self) -> &'static str {
            "echo-events"
        }

        fn normalize(&self, n: &Notification) -> Result<Option<Normalized>, AdapterError> {
            if n.kind == "noise" {
                return Ok(None);
            }
            let id = required_str(&n.payload, "id", "echo", &n.kind)?;
            Ok(Some(Normalized {
                event_type: EventType::Custom,
                payload: n.payload.clone(),
                fingerprint: format!("echo:{id}"),
            }))
        }
    }

    fn ingestor(sink: Arc<CollectingSink>) -> Ingestor {
        Ingestor::new(sink as Arc<dyn EventSink>, Deduplicator::new(60)).with_adapter(Arc::new(Echo))
    }

    #[tokio::test]
    async fn emits_once_per_fingerprint() {
        let sink = Arc::new(CollectingSink::default());
        let ingestor = ingestor(Arc::clone(&sink));

        let first = ingestor
            .ingest(Notification::new("echo", "ping", json!({ "id": "1" })))
            .await
            .unwrap();
        assert!(matches!(first, IngestOutcome::Emitted(_)));
        let again = ingestor
            .ingest(Notification::new("echo", "ping", json!({ "id": "1" })))
            .await
            .unwrap();
        assert_eq!(again, IngestOutcome::Duplicate);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "echo-events");
    }

    #[tokio::test]
    async fn ignored_and_unknown_notifications() {
        let sink = Arc::new(CollectingSink::default());
        let ingestor = ingestor(Arc::clone(&sink));

        let outcome = ingestor
            .ingest(Notification::new("echo", "noise", json!({})))
            .await
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);

        let err = ingestor
            .ingest(Notification::new("jira", "issue", json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdapterError::UnknownSource {
                source: "jira".to_string()
            }
        );

        let err = ingestor
            .ingest(Notification::new("echo", "ping", json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing id"));
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_emit_does_not_poison_fingerprint() {
        let sink = Arc::new(CollectingSink {
            closed: true,
            ..CollectingSink::default()
        });
        let dedup = Deduplicator::new(60);
        let ingestor = Ingestor::new(sink as Arc<dyn EventSink>, dedup.clone())
            .with_adapter(Arc::new(Echo));

        let err = ingestor
            .ingest(Notification::new("echo", "ping", json!({ "id": "1" })))
            .await
            .unwrap_err();
        assert_eq!(err, AdapterError::Emit(DispatchError::Closed));
        assert!(dedup.is_empty());
    }
}
