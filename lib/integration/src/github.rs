//! GitHub notifications.
//!
//! Kinds follow the `X-GitHub-Event` header: `pull_request`, `create`,
//! `push` and `repository`. Pollers produce the same shapes.

use crate::adapter::{Normalized, Notification, NotificationAdapter, copy, required, required_str};
use crate::error::AdapterError;
use serde_json::{Value as JsonValue, json};
use toolbar_workflow::{EventType, lookup_path};

const SOURCE: &str = "github";

/// Normalizes GitHub webhook and poll payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct GithubAdapter;

impl NotificationAdapter for GithubAdapter {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn emitter(&self) -> &'static str {
        "github-events"
    }

    fn normalize(&self, notification: &Notification) -> Result<Option<Normalized>, AdapterError> {
        let payload = &notification.payload;
        let kind = notification.kind.as_str();
        match kind {
            "pull_request" => pull_request(payload, kind),
            "create" => branch_created(payload, kind),
            "push" | "repository" => repository_updated(payload, kind),
            _ => Ok(None),
        }
    }
}

fn pull_request(payload: &JsonValue, kind: &str) -> Result<Option<Normalized>, AdapterError> {
    let action = required_str(payload, "action", SOURCE, kind)?;
    let merged = lookup_path(payload, "pull_request.merged")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);
    let event_type = match action {
        "opened" | "reopened" => EventType::GithubPrCreated,
        "synchronize" | "edited" => EventType::GithubPrUpdated,
        "closed" if merged => EventType::GithubPrMerged,
        _ => return Ok(None),
    };

    let repo = required_str(payload, "repository.full_name", SOURCE, kind)?;
    let number = required(payload, "pull_request.number", SOURCE, kind)?;
    // Distinguishes successive pushes to the same PR.
    let revision = lookup_path(payload, "pull_request.head.sha")
        .or_else(|| lookup_path(payload, "pull_request.updated_at"))
        .and_then(JsonValue::as_str)
        .unwrap_or_default();

    Ok(Some(Normalized {
        event_type,
        payload: json!({
            "action": action,
            "repository": { "full_name": repo },
            "pull_request": {
                "number": number,
                "title": copy(payload, "pull_request.title"),
                "body": copy(payload, "pull_request.body"),
                "html_url": copy(payload, "pull_request.html_url"),
                "user": { "login": copy(payload, "pull_request.user.login") },
                "head": {
                    "ref": copy(payload, "pull_request.head.ref"),
                    "sha": copy(payload, "pull_request.head.sha"),
                },
                "base": { "ref": copy(payload, "pull_request.base.ref") },
                "merged": merged,
            },
            "files": changed_files(payload),
        }),
        fingerprint: format!("github:pr:{repo}#{number}:{event_type}:{revision}"),
    }))
}

/// File names from a `files` list of strings or `{filename}` objects.
fn changed_files(payload: &JsonValue) -> JsonValue {
    let Some(files) = payload.get("files").and_then(JsonValue::as_array) else {
        return json!([]);
    };
    files
        .iter()
        .filter_map(|file| match file {
            JsonValue::String(name) => Some(name.clone()),
            other => other
                .get("filename")
                .and_then(JsonValue::as_str)
                .map(str::to_string),
        })
        .collect::<Vec<_>>()
        .into()
}

fn branch_created(payload: &JsonValue, kind: &str) -> Result<Option<Normalized>, AdapterError> {
    if payload.get("ref_type").and_then(JsonValue::as_str) != Some("branch") {
        return Ok(None);
    }
    let repo = required_str(payload, "repository.full_name", SOURCE, kind)?;
    let branch = required_str(payload, "ref", SOURCE, kind)?;
    Ok(Some(Normalized {
        event_type: EventType::GithubBranchCreated,
        payload: json!({
            "repository": { "full_name": repo },
            "ref": branch,
            "sender": { "login": copy(payload, "sender.login") },
        }),
        fingerprint: format!("github:branch:{repo}:{branch}"),
    }))
}

fn repository_updated(payload: &JsonValue, kind: &str) -> Result<Option<Normalized>, AdapterError> {
    let repo = required_str(payload, "repository.full_name", SOURCE, kind)?;
    let (action, revision) = if kind == "push" {
        let after = payload
            .get("after")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        ("push", after.to_string())
    } else {
        let action = required_str(payload, "action", SOURCE, kind)?;
        let updated = lookup_path(payload, "repository.updated_at")
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
            .unwrap_or_default();
        (action, updated)
    };
    Ok(Some(Normalized {
        event_type: EventType::GithubRepoUpdated,
        payload: json!({
            "action": action,
            "repository": { "full_name": repo },
            "ref": copy(payload, "ref"),
            "sender": { "login": copy(payload, "sender.login") },
        }),
        fingerprint: format!("github:repo:{repo}:{action}:{revision}"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(kind: &str, payload: JsonValue) -> Option<Normalized> {
        GithubAdapter
            .normalize(&Notification::new(SOURCE, kind, payload))
            .unwrap()
    }

    fn pr(action: &str, merged: bool) -> JsonValue {
        json!({
            "action": action,
            "repository": { "full_name": "acme/site" },
            "pull_request": {
                "number": 42,
                "title": "Update guide",
                "merged": merged,
                "user": { "login": "octo" },
                "head": { "ref": "docs", "sha": "abc123" },
                "base": { "ref": "main" }
            },
            "files": [{ "filename": "README.md" }, "docs/guide.md"]
        })
    }

    #[test]
    fn opened_pr_becomes_created_event() {
        let normalized = normalize("pull_request", pr("opened", false)).unwrap();
        assert_eq!(normalized.event_type, EventType::GithubPrCreated);
        assert!(EventType::GithubPrCreated
            .schema()
            .violations(&normalized.payload)
            .is_empty());
        assert_eq!(normalized.payload["files"], json!(["README.md", "docs/guide.md"]));
        assert_eq!(normalized.payload["pull_request"]["head"]["ref"], "docs");
        assert_eq!(
            normalized.fingerprint,
            "github:pr:acme/site#42:github_pr_created:abc123"
        );
    }

    #[test]
    fn pr_actions_map_to_event_types() {
        assert_eq!(
            normalize("pull_request", pr("synchronize", false)).unwrap().event_type,
            EventType::GithubPrUpdated
        );
        assert_eq!(
            normalize("pull_request", pr("closed", true)).unwrap().event_type,
            EventType::GithubPrMerged
        );
        assert!(normalize("pull_request", pr("closed", false)).is_none());
        assert!(normalize("pull_request", pr("labeled", false)).is_none());
    }

    #[test]
    fn branch_creation_only() {
        let payload = json!({
            "ref": "feature/x",
            "ref_type": "branch",
            "repository": { "full_name": "acme/site" },
            "sender": { "login": "octo" }
        });
        let normalized = normalize("create", payload).unwrap();
        assert_eq!(normalized.event_type, EventType::GithubBranchCreated);
        assert_eq!(normalized.payload["ref"], "feature/x");

        let tag = json!({ "ref": "v1", "ref_type": "tag", "repository": { "full_name": "acme/site" } });
        assert!(normalize("create", tag).is_none());
    }

    #[test]
    fn push_updates_repository() {
        let payload = json!({
            "ref": "refs/heads/main",
            "after": "def456",
            "repository": { "full_name": "acme/site" },
            "sender": { "login": "octo" }
        });
        let normalized = normalize("push", payload).unwrap();
        assert_eq!(normalized.event_type, EventType::GithubRepoUpdated);
        assert_eq!(normalized.payload["action"], "push");
        assert_eq!(normalized.fingerprint, "github:repo:acme/site:push:def456");
    }

    #[test]
    fn ping_is_ignored_and_missing_number_fails() {
        assert!(normalize("ping", json!({ "zen": "Keep it simple." })).is_none());

        let mut payload = pr("opened", false);
        payload["pull_request"]
            .as_object_mut()
            .unwrap()
            .remove("number");
        let err = GithubAdapter
            .normalize(&Notification::new(SOURCE, "pull_request", payload))
            .unwrap_err();
        assert!(err.to_string().contains("pull_request.number"));
    }
}
