//! Linear issue notifications.
//!
//! Linear webhooks carry `{action, type, data}`. The notification kind is
//! the `type` value; only `Issue` is an event.

use crate::adapter::{Normalized, Notification, NotificationAdapter, copy, required_str};
use crate::error::AdapterError;
use serde_json::{Value as JsonValue, json};
use toolbar_workflow::{EventType, lookup_path};

const SOURCE: &str = "linear";

/// Workflow state types Linear uses for finished issues.
const CLOSED_STATE_TYPES: &[&str] = &["completed", "canceled"];

/// Normalizes Linear webhook and poll payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearAdapter;

impl NotificationAdapter for LinearAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn emitter(&self) -> &'static str {
        "linear-events"
    }

    fn normalize(&self, notification: &Notification) -> Result<Option<Normalized>, AdapterError> {
        if !notification.kind.eq_ignore_ascii_case("issue") {
            return Ok(None);
        }
        let payload = &notification.payload;
        let kind = notification.kind.as_str();

        let action = required_str(payload, "action", SOURCE, kind)?;
        let state_type = lookup_path(payload, "data.state.type").and_then(JsonValue::as_str);
        let event_type = match action {
            "create" => EventType::LinearIssueCreated,
            "update" if state_type.is_some_and(|t| CLOSED_STATE_TYPES.contains(&t)) => {
                EventType::LinearIssueClosed
            }
            "update" => EventType::LinearIssueUpdated,
            _ => return Ok(None),
        };

        let id = required_str(payload, "data.id", SOURCE, kind)?;
        let updated_at = lookup_path(payload, "data.updatedAt")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();

        Ok(Some(Normalized {
            event_type,
            payload: json!({
                "action": action,
                "issue": {
                    "id": id,
                    "identifier": copy(payload, "data.identifier"),
                    "title": copy(payload, "data.title"),
                    "description": copy(payload, "data.description"),
                    "url": copy(payload, "data.url"),
                    "priority": copy(payload, "data.priority"),
                    "state": copy(payload, "data.state.name"),
                    "team": { "key": copy(payload, "data.team.key") },
                    "assignee": { "name": copy(payload, "data.assignee.name") },
                },
            }),
            fingerprint: format!("linear:issue:{id}:{event_type}:{updated_at}"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(action: &str, state_type: &str) -> Notification {
        Notification::new(
            SOURCE,
            "Issue",
            json!({
                "action": action,
                "type": "Issue",
                "data": {
                    "id": "9f2c",
                    "identifier": "ENG-12",
                    "title": "Crash on save",
                    "state": { "name": "In Progress", "type": state_type },
                    "team": { "key": "ENG" },
                    "updatedAt": "2026-10-01T09:00:00.000Z"
                }
            }),
        )
    }

    #[test]
    fn created_issue() {
        let normalized = LinearAdapter.normalize(&issue("create", "unstarted")).unwrap().unwrap();
        assert_eq!(normalized.event_type, EventType::LinearIssueCreated);
        assert!(EventType::LinearIssueCreated
            .schema()
            .violations(&normalized.payload)
            .is_empty());
        assert_eq!(normalized.payload["issue"]["team"]["key"], "ENG");
        assert_eq!(normalized.payload["issue"]["state"], "In Progress");
    }

    #[test]
    fn update_into_finished_state_closes() {
        let updated = LinearAdapter.normalize(&issue("update", "started")).unwrap().unwrap();
        assert_eq!(updated.event_type, EventType::LinearIssueUpdated);
        let closed = LinearAdapter.normalize(&issue("update", "completed")).unwrap().unwrap();
        assert_eq!(closed.event_type, EventType::LinearIssueClosed);
        assert_ne!(updated.fingerprint, closed.fingerprint);
    }

    #[test]
    fn other_kinds_and_actions_are_ignored() {
        assert!(LinearAdapter.normalize(&issue("remove", "started")).unwrap().is_none());
        let comment = Notification::new(SOURCE, "Comment", json!({ "action": "create" }));
        assert!(LinearAdapter.normalize(&comment).unwrap().is_none());
    }
}
