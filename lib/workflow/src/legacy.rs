//! Migration of flat `{trigger, actions[]}` workflow records.
//!
//! The flat format has one trigger and an ordered action list that always
//! runs to the end. It becomes a graph with the trigger as root followed by
//! a chain of non-blocking action nodes. Disabled actions are dropped, and
//! a disabled trigger disables the workflow.

use crate::catalog::{ActionKind, EventType, scalar_text};
use crate::condition::{Condition, Operator};
use crate::definition::Workflow;
use crate::edge::Edge;
use crate::node::{ActionSpec, Node, TriggerSpec};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use toolbar_core::WorkflowId;

/// Whether a persisted item uses the flat format.
#[must_use]
pub fn is_legacy(item: &JsonValue) -> bool {
    item.get("actions").is_some_and(JsonValue::is_array) && item.get("nodes").is_none()
}

#[derive(Debug, Deserialize)]
struct LegacyWorkflow {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    trigger: LegacyTrigger,
    #[serde(default)]
    actions: Vec<LegacyAction>,
    #[serde(default = "yes")]
    enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyTrigger {
    #[serde(default)]
    name: String,
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    conditions: Vec<LegacyCondition>,
    #[serde(default = "yes")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct LegacyCondition {
    #[serde(default)]
    field: String,
    #[serde(default)]
    operator: Option<String>,
    #[serde(default)]
    value: JsonValue,
}

#[derive(Debug, Deserialize)]
struct LegacyAction {
    #[serde(default)]
    name: String,
    #[serde(default)]
    action_type: String,
    #[serde(default)]
    parameters: Vec<LegacyParameter>,
    #[serde(default = "yes")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
struct LegacyParameter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: JsonValue,
}

fn yes() -> bool {
    true
}

/// Convert one flat record into a workflow.
///
/// Unknown event and action types fall back to `custom`. An unknown
/// operator rejects the record.
///
/// # Errors
///
/// Returns the reason the record cannot be converted.
pub fn migrate(item: JsonValue) -> Result<Workflow, String> {
    let legacy: LegacyWorkflow = serde_json::from_value(item).map_err(|e| e.to_string())?;

    let event_type = legacy
        .trigger
        .event_type
        .parse()
        .unwrap_or(EventType::Custom);
    let mut trigger = TriggerSpec::new(event_type);
    for condition in legacy.trigger.conditions {
        trigger.conditions.push(convert_condition(condition)?);
    }

    let name = if legacy.name.is_empty() {
        legacy.trigger.name.clone()
    } else {
        legacy.name
    };
    let mut workflow = Workflow::new(name, trigger);
    if let Ok(id) = legacy.id.parse::<WorkflowId>() {
        workflow.id = id;
    }
    if !legacy.description.is_empty() {
        workflow.metadata.description = Some(legacy.description);
    }
    let root = workflow.root();
    if let Some(node) = workflow.graph.get_node_mut(root) {
        if !legacy.trigger.name.is_empty() {
            node.name = legacy.trigger.name;
        }
    }
    workflow.metadata.enabled = legacy.enabled && legacy.trigger.enabled;

    let mut previous = root;
    for action in legacy.actions.into_iter().filter(|a| a.enabled) {
        let kind = action.action_type.parse().unwrap_or(ActionKind::Custom);
        let mut spec = ActionSpec::new(kind);
        for parameter in action.parameters {
            if parameter.name.is_empty() {
                continue;
            }
            let value = scalar_text(&parameter.value).unwrap_or_else(|| match &parameter.value {
                JsonValue::Null => String::new(),
                other => other.to_string(),
            });
            spec.parameters.insert(parameter.name, value);
        }
        let node = workflow.add_node(Node::action(action.name, spec));
        workflow
            .connect(previous, node, Edge::Unconditional)
            .map_err(|e| e.to_string())?;
        previous = node;
    }

    Ok(workflow)
}

fn convert_condition(condition: LegacyCondition) -> Result<Condition, String> {
    let operator = condition.operator.as_deref().unwrap_or("equals");
    let parsed: Operator = serde_json::from_value(JsonValue::String(operator.to_string()))
        .map_err(|_| format!("unknown condition operator '{operator}'"))?;
    let value = match (parsed, condition.value) {
        // The flat format anchored patterns at the start of the value.
        (Operator::Matches, JsonValue::String(pattern)) if !pattern.starts_with('^') => {
            JsonValue::String(format!("^(?:{pattern})"))
        }
        (_, value) => value,
    };
    Ok(Condition::new(condition.field, parsed, value))
}
