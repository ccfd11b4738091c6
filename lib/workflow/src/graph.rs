//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where:
//! - Nodes are the trigger, conditions, actions and end markers
//! - Edges are unconditional, or on-true/on-false out of a condition
//!
//! Node and edge order is insertion order, which is also the persisted order.

use crate::edge::{Edge, EdgeRef};
use crate::error::GraphError;
use crate::node::{Node, NodeId, NodeKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef as _};
use std::collections::{HashMap, HashSet};

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from persisted nodes and edges.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate node IDs or edges naming unknown nodes.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = Node>,
        edges: impl IntoIterator<Item = EdgeRef>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for node in nodes {
            if graph.node_index_map.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode { node_id: node.id });
            }
            graph.add_node(node);
        }
        for edge in edges {
            graph.add_edge(edge.source, edge.target, edge.kind)?;
        }
        Ok(graph)
    }

    /// Adds a node to the graph.
    ///
    /// Returns the node ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        node_id
    }

    /// Removes a node from the graph.
    ///
    /// Also removes all edges connected to this node.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let index = self.node_index_map.remove(&node_id)?;
        let node = self.graph.remove_node(index);
        // petgraph moves the last node into the freed slot.
        self.rebuild_index_map();
        node
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight(*index)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight_mut(*index)
    }

    /// Adds an edge between two nodes.
    ///
    /// Edge kinds are checked against node kinds by [`validate`](Self::validate),
    /// so a graph can be assembled in any order.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or target node doesn't exist.
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        edge: Edge,
    ) -> Result<(), GraphError> {
        let source_index = self.index_of(source_id)?;
        let target_index = self.index_of(target_id)?;
        self.graph.add_edge(source_index, target_index, edge);
        Ok(())
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> Vec<EdgeRef> {
        self.graph
            .edge_references()
            .map(|e| EdgeRef::new(self.graph[e.source()].id, self.graph[e.target()].id, *e.weight()))
            .collect()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Outgoing edges of a node with their targets, in insertion order.
    #[must_use]
    pub fn outgoing(&self, node_id: NodeId) -> Vec<(Edge, &Node)> {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| (e.id(), *e.weight(), &self.graph[e.target()]))
            .collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, kind, node)| (kind, node)).collect()
    }

    /// Number of edges pointing at a node.
    #[must_use]
    pub fn incoming_count(&self, node_id: NodeId) -> usize {
        self.node_index_map.get(&node_id).map_or(0, |&index| {
            self.graph.edges_directed(index, Direction::Incoming).count()
        })
    }

    /// Validates the workflow graph rooted at `root`.
    ///
    /// Checks, in order:
    /// - Exactly one trigger, which is the root and has no incoming edges
    /// - Condition nodes have exactly one on-true and one on-false edge
    /// - Other nodes have only unconditional edges; actions at most one, end nodes none
    /// - No cycles
    /// - Every node is reachable from the root
    /// - Conditions and actions are well-formed
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self, root: NodeId) -> Result<(), GraphError> {
        match self.nodes().filter(|n| n.is_trigger()).count() {
            0 => return Err(GraphError::MissingTrigger),
            1 => {}
            count => return Err(GraphError::MultipleTriggers { count }),
        }

        let root_index = self.index_of(root)?;
        if !self.graph[root_index].is_trigger() || self.incoming_count(root) > 0 {
            return Err(GraphError::InvalidRoot { node_id: root });
        }

        for node in self.nodes() {
            let kinds: Vec<Edge> = self.outgoing(node.id).into_iter().map(|(k, _)| k).collect();
            match &node.kind {
                NodeKind::Condition(_) => {
                    if kinds.contains(&Edge::Unconditional) {
                        return Err(GraphError::InvalidEdgeKind {
                            node_id: node.id,
                            kind: Edge::Unconditional,
                        });
                    }
                    for branch in [Edge::OnTrue, Edge::OnFalse] {
                        match kinds.iter().filter(|k| **k == branch).count() {
                            0 => {
                                return Err(GraphError::ConditionBranchMissing {
                                    node_id: node.id,
                                    branch,
                                });
                            }
                            1 => {}
                            _ => {
                                return Err(GraphError::DuplicateBranch {
                                    node_id: node.id,
                                    branch,
                                });
                            }
                        }
                    }
                }
                kind => {
                    if let Some(branch) = kinds.iter().find(|k| k.is_branch()) {
                        return Err(GraphError::InvalidEdgeKind {
                            node_id: node.id,
                            kind: *branch,
                        });
                    }
                    match kind {
                        NodeKind::Action(_) if kinds.len() > 1 => {
                            return Err(GraphError::TooManySuccessors {
                                node_id: node.id,
                                count: kinds.len(),
                            });
                        }
                        NodeKind::End if !kinds.is_empty() => {
                            return Err(GraphError::EndHasSuccessors { node_id: node.id });
                        }
                        _ => {}
                    }
                }
            }
        }

        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(GraphError::CycleDetected);
        }

        let mut reachable = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, root_index);
        while let Some(index) = dfs.next(&self.graph) {
            reachable.insert(index);
        }
        if let Some(index) = self.graph.node_indices().find(|i| !reachable.contains(i)) {
            return Err(GraphError::UnreachableNode {
                node_id: self.graph[index].id,
            });
        }

        for node in self.nodes() {
            match &node.kind {
                NodeKind::Trigger(spec) => {
                    for condition in &spec.conditions {
                        condition.check().map_err(|reason| GraphError::InvalidCondition {
                            node_id: node.id,
                            reason,
                        })?;
                    }
                }
                NodeKind::Condition(condition) => {
                    condition.check().map_err(|reason| GraphError::InvalidCondition {
                        node_id: node.id,
                        reason,
                    })?;
                }
                NodeKind::Action(spec) => {
                    spec.check().map_err(|reason| GraphError::InvalidAction {
                        node_id: node.id,
                        reason,
                    })?;
                }
                NodeKind::End => {}
            }
        }

        Ok(())
    }

    /// Rebuilds the node index map from the underlying graph.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id, index);
            }
        }
    }

    fn index_of(&self, node_id: NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index_map
            .get(&node_id)
            .copied()
            .ok_or(GraphError::NodeNotFound { node_id })
    }
}
