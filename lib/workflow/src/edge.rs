//! Edge types for workflow graphs.
//!
//! Edges out of a condition node are `OnTrue` or `OnFalse`; every other
//! edge is `Unconditional`.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a graph edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    #[default]
    Unconditional,
    OnTrue,
    OnFalse,
}

impl Edge {
    /// The branch edge taken for a condition result.
    #[must_use]
    pub fn branch(result: bool) -> Self {
        if result { Self::OnTrue } else { Self::OnFalse }
    }

    #[must_use]
    pub fn is_branch(self) -> bool {
        !matches!(self, Self::Unconditional)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unconditional => "unconditional",
            Self::OnTrue => "on_true",
            Self::OnFalse => "on_false",
        })
    }
}

/// A complete edge reference including source and target node IDs.
///
/// This is the persisted form of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default)]
    pub kind: Edge,
}

impl EdgeRef {
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, kind: Edge) -> Self {
        Self {
            source,
            target,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_selects_edge_kind() {
        assert_eq!(Edge::branch(true), Edge::OnTrue);
        assert_eq!(Edge::branch(false), Edge::OnFalse);
        assert!(!Edge::Unconditional.is_branch());
    }

    #[test]
    fn edge_kind_defaults_to_unconditional() {
        let source = NodeId::new();
        let target = NodeId::new();
        let json = serde_json::json!({ "source": source, "target": target });
        let parsed: EdgeRef = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed, EdgeRef::new(source, target, Edge::Unconditional));
    }
}
