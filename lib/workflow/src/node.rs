//! Workflow node types.
//!
//! A workflow graph has exactly one trigger node as its root. Below it,
//! condition nodes branch on a single condition, action nodes dispatch an
//! action to a target plugin, and end nodes terminate a branch explicitly.

use crate::catalog::{ActionKind, EventType};
use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Root of a workflow: the event type it reacts to and AND-combined
/// conditions on the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub event_type: EventType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl TriggerSpec {
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            conditions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// An action to dispatch to a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub action: ActionKind,
    /// Target plugin; the action kind's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Parameter templates with `{field.path}` placeholders.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// A blocking action that does not succeed aborts the run.
    #[serde(default)]
    pub blocking: bool,
}

impl ActionSpec {
    #[must_use]
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            target: None,
            parameters: BTreeMap::new(),
            blocking: false,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), template.into());
        self
    }

    #[must_use]
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// The plugin this action is sent to.
    #[must_use]
    pub fn resolved_target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .filter(|t| !t.is_empty())
            .or_else(|| self.action.default_target())
    }

    /// Static checks done when a workflow is saved.
    pub fn check(&self) -> Result<(), String> {
        if self.resolved_target().is_none() {
            return Err(format!("{} action requires an explicit target", self.action));
        }
        for required in self.action.required_parameters() {
            if self.parameters.get(*required).is_none_or(|v| v.trim().is_empty()) {
                return Err(format!(
                    "{} action requires parameter '{required}'",
                    self.action
                ));
            }
        }
        Ok(())
    }
}

/// What a node does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Trigger(TriggerSpec),
    /// Follows its on-true or on-false edge.
    Condition(Condition),
    Action(ActionSpec),
    /// Explicit branch terminator.
    End,
}

impl NodeKind {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Trigger(_) => "trigger",
            Self::Condition(_) => "condition",
            Self::Action(_) => "action",
            Self::End => "end",
        }
    }
}

/// A workflow node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), name, kind)
    }

    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }

    #[must_use]
    pub fn trigger(name: impl Into<String>, spec: TriggerSpec) -> Self {
        Self::new(name, NodeKind::Trigger(spec))
    }

    #[must_use]
    pub fn condition(name: impl Into<String>, condition: Condition) -> Self {
        Self::new(name, NodeKind::Condition(condition))
    }

    #[must_use]
    pub fn action(name: impl Into<String>, spec: ActionSpec) -> Self {
        Self::new(name, NodeKind::Action(spec))
    }

    #[must_use]
    pub fn end(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::End)
    }

    #[must_use]
    pub fn is_trigger(&self) -> bool {
        matches!(self.kind, NodeKind::Trigger(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use serde_json::json;

    #[test]
    fn node_id_display() {
        let id = NodeId::new();
        assert!(id.to_string().starts_with("node_"));
    }

    #[test]
    fn resolved_target_prefers_explicit() {
        let spec = ActionSpec::new(ActionKind::AutoMergePr);
        assert_eq!(spec.resolved_target(), Some("github"));
        let spec = spec.with_target("github-enterprise");
        assert_eq!(spec.resolved_target(), Some("github-enterprise"));
        assert_eq!(ActionSpec::new(ActionKind::Custom).resolved_target(), None);
    }

    #[test]
    fn action_check_requires_parameters() {
        let err = ActionSpec::new(ActionKind::SendPrompt).check().unwrap_err();
        assert!(err.contains("prompt_template"));

        let ok = ActionSpec::new(ActionKind::SendPrompt)
            .with_parameter("prompt_template", "Review {pull_request.title}");
        assert!(ok.check().is_ok());

        let err = ActionSpec::new(ActionKind::Custom).check().unwrap_err();
        assert!(err.contains("explicit target"));
    }

    #[test]
    fn node_wire_format() {
        let node = Node::condition(
            "docs only",
            Condition::new("files", Operator::AllEndWith, ".md"),
        );
        let value = serde_json::to_value(&node).expect("serialize");
        assert_eq!(value["kind"]["type"], json!("condition"));
        assert_eq!(value["kind"]["operator"], json!("all_end_with"));
        let parsed: Node = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, node);
    }
}
