//! Error types for the workflow crate.
//!
//! - `GraphError`: structural problems found while building or validating a graph
//! - `WorkflowError`: store-level failures, carrying the workflow id and name
//! - `ActionDispatchError`: why one action dispatch did not succeed
//! - `DispatchError`: event bus failures
//! - `StoreError`: key-value backend failures

use crate::edge::Edge;
use crate::node::NodeId;
use std::fmt;
use toolbar_core::WorkflowId;

/// Errors from graph construction and validation.
///
/// These errors only know about nodes. Workflow context is added by the
/// store when it reports `WorkflowError::InvalidWorkflow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Two nodes share one ID.
    DuplicateNode { node_id: NodeId },
    /// The graph has no trigger node.
    MissingTrigger,
    /// More than one trigger node.
    MultipleTriggers { count: usize },
    /// The root is not a trigger node, or the trigger has incoming edges.
    InvalidRoot { node_id: NodeId },
    /// A condition node lacks its on-true or on-false edge.
    ConditionBranchMissing { node_id: NodeId, branch: Edge },
    /// A condition node has more than one edge for the same branch.
    DuplicateBranch { node_id: NodeId, branch: Edge },
    /// Branch edge out of a non-condition node, or unconditional edge out of a condition.
    InvalidEdgeKind { node_id: NodeId, kind: Edge },
    /// An action node has more than one outgoing edge.
    TooManySuccessors { node_id: NodeId, count: usize },
    /// An end node has outgoing edges.
    EndHasSuccessors { node_id: NodeId },
    /// Graph contains cycles.
    CycleDetected,
    /// Node is not reachable from the trigger.
    UnreachableNode { node_id: NodeId },
    /// Condition rejected at validation (empty field, bad regex, wrong literal type).
    InvalidCondition { node_id: NodeId, reason: String },
    /// Action node misconfigured (missing parameter or target).
    InvalidAction { node_id: NodeId, reason: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::MissingTrigger => write!(f, "workflow has no trigger node"),
            Self::MultipleTriggers { count } => {
                write!(f, "workflow has {count} trigger nodes, expected exactly one")
            }
            Self::InvalidRoot { node_id } => {
                write!(f, "node {node_id} cannot be the workflow root")
            }
            Self::ConditionBranchMissing { node_id, branch } => {
                write!(f, "condition node {node_id} has no {branch} edge")
            }
            Self::DuplicateBranch { node_id, branch } => {
                write!(f, "condition node {node_id} has more than one {branch} edge")
            }
            Self::InvalidEdgeKind { node_id, kind } => {
                write!(f, "node {node_id} cannot have an outgoing {kind} edge")
            }
            Self::TooManySuccessors { node_id, count } => {
                write!(f, "action node {node_id} has {count} outgoing edges, expected at most one")
            }
            Self::EndHasSuccessors { node_id } => {
                write!(f, "end node {node_id} has outgoing edges")
            }
            Self::CycleDetected => write!(f, "graph contains cycles"),
            Self::UnreachableNode { node_id } => {
                write!(f, "node {node_id} is not reachable from the trigger")
            }
            Self::InvalidCondition { node_id, reason } => {
                write!(f, "invalid condition on node {node_id}: {reason}")
            }
            Self::InvalidAction { node_id, reason } => {
                write!(f, "invalid action on node {node_id}: {reason}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Store-level workflow errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Validation rejected the definition; the persisted version is untouched.
    InvalidWorkflow {
        workflow_id: WorkflowId,
        name: String,
        reason: String,
    },
    /// Workflow not found.
    NotFound { workflow_id: WorkflowId },
    /// The backend failed to load or save.
    Storage { reason: String },
    /// The persisted document has a version this build does not read.
    UnsupportedVersion { version: u64 },
    /// The persisted document is not a workflow list.
    InvalidDocument { reason: String },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWorkflow {
                workflow_id,
                name,
                reason,
            } => write!(f, "invalid workflow '{name}' ({workflow_id}): {reason}"),
            Self::NotFound { workflow_id } => write!(f, "workflow not found: {workflow_id}"),
            Self::Storage { reason } => write!(f, "workflow storage failed: {reason}"),
            Self::UnsupportedVersion { version } => {
                write!(f, "unsupported workflow document version {version}")
            }
            Self::InvalidDocument { reason } => {
                write!(f, "invalid workflow document: {reason}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

/// Why an action dispatch ended in outcome `error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDispatchError {
    /// The action has neither an explicit nor a default target.
    NoTarget { action: String },
    /// The target plugin is not registered or not active.
    TargetUnavailable { target: String, reason: String },
    /// The plugin did not answer within the action timeout.
    Timeout { target: String, timeout_ms: u128 },
    /// The plugin returned an error.
    Plugin { target: String, reason: String },
}

impl fmt::Display for ActionDispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTarget { action } => write!(f, "no target plugin for {action} action"),
            Self::TargetUnavailable { reason, .. } => write!(f, "{reason}"),
            Self::Timeout { target, timeout_ms } => {
                write!(f, "plugin '{target}' timed out after {timeout_ms}ms")
            }
            Self::Plugin { target, reason } => write!(f, "plugin '{target}': {reason}"),
        }
    }
}

impl std::error::Error for ActionDispatchError {}

/// Event bus errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher has shut down and accepts no more events.
    Closed,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "event dispatcher is closed"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Key-value backend errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Io { key: String, reason: String },
    Serialization { key: String, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { key, reason } => write!(f, "i/o error for key '{key}': {reason}"),
            Self::Serialization { key, reason } => {
                write!(f, "malformed data for key '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}
