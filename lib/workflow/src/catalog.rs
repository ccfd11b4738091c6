//! Event and action catalog.
//!
//! The static set of event kinds the engine can be triggered by, each with
//! the payload fields adapters are expected to provide, and the action kinds
//! a workflow can dispatch, each with its default target plugin and required
//! parameters.

use crate::event::lookup_path;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Error returned when a catalog tag is unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCatalogError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseCatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseCatalogError {}

/// Expected JSON type of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Number,
    Bool,
    List,
    Object,
}

impl FieldKind {
    #[must_use]
    pub fn matches(self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One field of a payload schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub path: &'static str,
    pub kind: FieldKind,
}

const fn field(path: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { path, kind }
}

const PULL_REQUEST_FIELDS: &[FieldSpec] = &[
    field("repository.full_name", FieldKind::String),
    field("pull_request.number", FieldKind::Number),
    field("pull_request.title", FieldKind::String),
    field("pull_request.user.login", FieldKind::String),
    field("pull_request.head.ref", FieldKind::String),
    field("pull_request.base.ref", FieldKind::String),
    field("files", FieldKind::List),
];

const BRANCH_FIELDS: &[FieldSpec] = &[
    field("repository.full_name", FieldKind::String),
    field("ref", FieldKind::String),
    field("sender.login", FieldKind::String),
];

const REPOSITORY_FIELDS: &[FieldSpec] = &[
    field("repository.full_name", FieldKind::String),
    field("action", FieldKind::String),
];

const ISSUE_FIELDS: &[FieldSpec] = &[
    field("issue.id", FieldKind::String),
    field("issue.identifier", FieldKind::String),
    field("issue.title", FieldKind::String),
    field("issue.state", FieldKind::String),
    field("issue.team.key", FieldKind::String),
];

/// Field path to expected type for an event kind's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadSchema {
    fields: &'static [FieldSpec],
}

impl PayloadSchema {
    #[must_use]
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    #[must_use]
    pub fn kind_of(&self, path: &str) -> Option<FieldKind> {
        self.fields.iter().find(|f| f.path == path).map(|f| f.kind)
    }

    /// Fields that are absent from `payload` or have the wrong type.
    #[must_use]
    pub fn violations(&self, payload: &JsonValue) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| !lookup_path(payload, f.path).is_some_and(|v| f.kind.matches(v)))
            .map(|f| f.path)
            .collect()
    }
}

/// Kinds of events that can trigger a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    GithubPrCreated,
    GithubPrUpdated,
    GithubPrMerged,
    GithubBranchCreated,
    GithubRepoUpdated,
    LinearIssueCreated,
    LinearIssueUpdated,
    LinearIssueClosed,
    Custom,
}

impl EventType {
    pub const ALL: [Self; 9] = [
        Self::GithubPrCreated,
        Self::GithubPrUpdated,
        Self::GithubPrMerged,
        Self::GithubBranchCreated,
        Self::GithubRepoUpdated,
        Self::LinearIssueCreated,
        Self::LinearIssueUpdated,
        Self::LinearIssueClosed,
        Self::Custom,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GithubPrCreated => "github_pr_created",
            Self::GithubPrUpdated => "github_pr_updated",
            Self::GithubPrMerged => "github_pr_merged",
            Self::GithubBranchCreated => "github_branch_created",
            Self::GithubRepoUpdated => "github_repo_updated",
            Self::LinearIssueCreated => "linear_issue_created",
            Self::LinearIssueUpdated => "linear_issue_updated",
            Self::LinearIssueClosed => "linear_issue_closed",
            Self::Custom => "custom",
        }
    }

    #[must_use]
    pub fn schema(self) -> PayloadSchema {
        let fields = match self {
            Self::GithubPrCreated | Self::GithubPrUpdated | Self::GithubPrMerged => {
                PULL_REQUEST_FIELDS
            }
            Self::GithubBranchCreated => BRANCH_FIELDS,
            Self::GithubRepoUpdated => REPOSITORY_FIELDS,
            Self::LinearIssueCreated | Self::LinearIssueUpdated | Self::LinearIssueClosed => {
                ISSUE_FIELDS
            }
            Self::Custom => &[],
        };
        PayloadSchema { fields }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseCatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseCatalogError {
                kind: "event type",
                value: s.to_string(),
            })
    }
}

/// Kinds of actions a workflow can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendPrompt,
    CreateLinearIssue,
    AutoMergePr,
    RunScript,
    Custom,
}

impl ActionKind {
    pub const ALL: [Self; 5] = [
        Self::SendPrompt,
        Self::CreateLinearIssue,
        Self::AutoMergePr,
        Self::RunScript,
        Self::Custom,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendPrompt => "send_prompt",
            Self::CreateLinearIssue => "create_linear_issue",
            Self::AutoMergePr => "auto_merge_pr",
            Self::RunScript => "run_script",
            Self::Custom => "custom",
        }
    }

    /// Plugin that receives this action when the node names no target.
    #[must_use]
    pub fn default_target(self) -> Option<&'static str> {
        match self {
            Self::SendPrompt => Some("prompting"),
            Self::CreateLinearIssue => Some("linear"),
            Self::AutoMergePr => Some("github"),
            Self::RunScript => Some("automation"),
            Self::Custom => None,
        }
    }

    /// Parameters a node of this kind must define.
    #[must_use]
    pub fn required_parameters(self) -> &'static [&'static str] {
        match self {
            Self::SendPrompt => &["prompt_template"],
            Self::CreateLinearIssue => &["title_template"],
            Self::RunScript => &["script_id"],
            Self::AutoMergePr | Self::Custom => &[],
        }
    }

    /// Fill parameters this kind can derive from the event when absent.
    ///
    /// Auto-merge takes the repository and pull request number from the
    /// triggering pull request.
    pub fn fill_from_event(self, parameters: &mut BTreeMap<String, String>, payload: &JsonValue) {
        if self != Self::AutoMergePr {
            return;
        }
        for (key, path) in [
            ("repo", "repository.full_name"),
            ("pr_number", "pull_request.number"),
        ] {
            if !parameters.get(key).is_none_or(|v| v.is_empty()) {
                continue;
            }
            if let Some(value) = lookup_path(payload, path).and_then(scalar_text) {
                parameters.insert(key.to_string(), value);
            }
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ParseCatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseCatalogError {
                kind: "action kind",
                value: s.to_string(),
            })
    }
}

/// Text form of a scalar JSON value. Null and containers have none.
#[must_use]
pub fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}
