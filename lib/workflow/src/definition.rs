//! Workflow definition types.
//!
//! A workflow is a named automation that consists of:
//! - Metadata (name, description, enabled flag, priority, timestamps)
//! - A directed graph of nodes rooted at a single trigger node
//!
//! The persisted form is a flat record with the trigger pulled out of the
//! node list: `{id, name, enabled, trigger, nodes[], edges[]}`.

use crate::catalog::EventType;
use crate::condition::Condition;
use crate::edge::{Edge, EdgeRef};
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId, NodeKind, TriggerSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolbar_core::WorkflowId;

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    /// Human-readable name for this workflow.
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    /// Higher priority workflows run first when several match one event.
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            priority: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A complete workflow definition.
///
/// Serializes through [`WorkflowRecord`]; deserializing rebuilds the graph
/// but does not validate it. The store validates on load and save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "WorkflowRecord", try_from = "WorkflowRecord")]
pub struct Workflow {
    pub id: WorkflowId,
    pub metadata: WorkflowMetadata,
    pub graph: WorkflowGraph,
    root: NodeId,
}

impl Workflow {
    /// Creates a new workflow whose graph holds only its trigger.
    #[must_use]
    pub fn new(name: impl Into<String>, trigger: TriggerSpec) -> Self {
        let mut graph = WorkflowGraph::new();
        let root = graph.add_node(Node::trigger("trigger", trigger));
        Self {
            id: WorkflowId::new(),
            metadata: WorkflowMetadata::new(name),
            graph,
            root,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: WorkflowId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.metadata.priority = priority;
        self
    }

    /// Returns the workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns whether the workflow is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }

    /// Enables the workflow.
    pub fn enable(&mut self) {
        self.metadata.enabled = true;
        self.touch();
    }

    /// Disables the workflow.
    pub fn disable(&mut self) {
        self.metadata.enabled = false;
        self.touch();
    }

    /// Marks the workflow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }

    /// The trigger node's ID.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn trigger(&self) -> Option<&TriggerSpec> {
        match &self.graph.get_node(self.root)?.kind {
            NodeKind::Trigger(spec) => Some(spec),
            _ => None,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        self.trigger().map(|t| t.event_type)
    }

    /// Whether this workflow subscribes to events of `event_type`.
    #[must_use]
    pub fn listens_to(&self, event_type: EventType) -> bool {
        self.is_enabled() && self.event_type() == Some(event_type)
    }

    /// Adds a node below the trigger. Connect it with [`connect`](Self::connect).
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.graph.add_node(node)
    }

    /// # Errors
    ///
    /// Returns an error if either node is missing.
    pub fn connect(&mut self, source: NodeId, target: NodeId, edge: Edge) -> Result<(), GraphError> {
        self.graph.add_edge(source, target, edge)
    }

    /// Validates the workflow graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the workflow graph is invalid.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.graph.validate(self.root)
    }
}

/// Trigger section of a persisted workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    pub event_type: EventType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Persisted form of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: WorkflowId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
    pub trigger: TriggerRecord,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<EdgeRef>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn enabled_by_default() -> bool {
    true
}

impl From<Workflow> for WorkflowRecord {
    fn from(workflow: Workflow) -> Self {
        let root = workflow.root;
        let trigger = match workflow.graph.get_node(root) {
            Some(Node {
                name,
                kind: NodeKind::Trigger(spec),
                ..
            }) => TriggerRecord {
                id: root,
                name: name.clone(),
                event_type: spec.event_type,
                conditions: spec.conditions.clone(),
            },
            // Only reachable for graphs that would fail validation.
            _ => TriggerRecord {
                id: root,
                name: String::new(),
                event_type: EventType::Custom,
                conditions: Vec::new(),
            },
        };
        Self {
            id: workflow.id,
            name: workflow.metadata.name,
            description: workflow.metadata.description,
            enabled: workflow.metadata.enabled,
            priority: workflow.metadata.priority,
            trigger,
            nodes: workflow
                .graph
                .nodes()
                .filter(|n| n.id != root)
                .cloned()
                .collect(),
            edges: workflow.graph.edges(),
            created_at: workflow.metadata.created_at,
            updated_at: workflow.metadata.updated_at,
        }
    }
}

impl TryFrom<WorkflowRecord> for Workflow {
    type Error = GraphError;

    fn try_from(record: WorkflowRecord) -> Result<Self, Self::Error> {
        let root = record.trigger.id;
        let trigger = Node::with_id(
            root,
            record.trigger.name,
            NodeKind::Trigger(TriggerSpec {
                event_type: record.trigger.event_type,
                conditions: record.trigger.conditions,
            }),
        );
        let graph = WorkflowGraph::from_parts(
            std::iter::once(trigger).chain(record.nodes),
            record.edges,
        )?;
        Ok(Self {
            id: record.id,
            metadata: WorkflowMetadata {
                name: record.name,
                description: record.description,
                enabled: record.enabled,
                priority: record.priority,
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
            graph,
            root,
        })
    }
}

/// Summary information about a workflow (for listings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: WorkflowId,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub priority: i32,
    pub event_type: Option<EventType>,
    /// Number of nodes in the graph, trigger included.
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            id: workflow.id,
            name: workflow.metadata.name.clone(),
            description: workflow.metadata.description.clone(),
            enabled: workflow.metadata.enabled,
            priority: workflow.metadata.priority,
            event_type: workflow.event_type(),
            node_count: workflow.graph.node_count(),
            updated_at: workflow.metadata.updated_at,
        }
    }
}
