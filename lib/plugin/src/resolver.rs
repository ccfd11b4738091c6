//! Dependency resolution.
//!
//! Produces a total load order in which every plugin follows all of its
//! dependencies. Among plugins whose dependencies are already satisfied, the
//! higher priority loads first and equal priorities load in name order, so
//! the same input always yields the same order.

use crate::descriptor::PluginDescriptor;
use crate::error::ResolveError;
use petgraph::Direction::{Incoming, Outgoing};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct Entry {
    priority: i32,
    deps: BTreeSet<String>,
}

type Entries = BTreeMap<String, Entry>;

/// Outcome of a partial resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialResolution {
    /// Load order of every plugin that can be loaded.
    pub order: Vec<String>,
    /// Plugins left out of `order`, in name order.
    pub excluded: Vec<ResolveError>,
}

/// Resolve a complete load order or fail.
///
/// Missing dependencies are checked first, in name order. When several
/// cycles exist, the one holding the alphabetically first plugin is
/// reported.
pub fn resolve<'a>(
    descriptors: impl IntoIterator<Item = &'a PluginDescriptor>,
) -> Result<Vec<String>, ResolveError> {
    let entries = collect(descriptors);

    for (name, entry) in &entries {
        if let Some(missing) = entry.deps.iter().find(|d| !entries.contains_key(*d)) {
            return Err(ResolveError::MissingDependency {
                plugin: name.clone(),
                dependency: missing.clone(),
            });
        }
    }

    let graph = DependencyGraph::new(&entries);
    let (order, leftover) = graph.load_order();
    if leftover.is_empty() {
        return Ok(order);
    }
    let cycle = graph
        .cycles()
        .iter()
        .map(|members| graph.cycle(members))
        .min()
        .unwrap_or_default();
    Err(ResolveError::CyclicDependency { cycle })
}

/// Resolve the longest loadable order, excluding plugins that cannot load.
///
/// A plugin is excluded when a dependency is missing, when it sits on a
/// cycle, or when any of its dependencies is excluded.
#[must_use]
pub fn resolve_partial<'a>(
    descriptors: impl IntoIterator<Item = &'a PluginDescriptor>,
) -> PartialResolution {
    let entries = collect(descriptors);
    let mut excluded: BTreeMap<String, ResolveError> = BTreeMap::new();

    loop {
        let mut changed = false;
        for (name, entry) in &entries {
            if excluded.contains_key(name) {
                continue;
            }
            for dep in &entry.deps {
                let reason = if !entries.contains_key(dep) {
                    ResolveError::MissingDependency {
                        plugin: name.clone(),
                        dependency: dep.clone(),
                    }
                } else if excluded.contains_key(dep) {
                    ResolveError::DependencyExcluded {
                        plugin: name.clone(),
                        dependency: dep.clone(),
                    }
                } else {
                    continue;
                };
                excluded.insert(name.clone(), reason);
                changed = true;
                break;
            }
        }
        if !changed {
            break;
        }
    }

    let remaining: Entries = entries
        .into_iter()
        .filter(|(name, _)| !excluded.contains_key(name))
        .collect();
    let graph = DependencyGraph::new(&remaining);
    let (order, leftover) = graph.load_order();

    let mut on_cycle: HashMap<NodeIndex, Vec<String>> = HashMap::new();
    for members in graph.cycles() {
        let cycle = graph.cycle(&members);
        for node in members {
            on_cycle.insert(node, cycle.clone());
        }
    }
    for &node in &leftover {
        let name = graph.name(node).to_string();
        let reason = match on_cycle.get(&node) {
            Some(cycle) => ResolveError::CyclicDependency {
                cycle: cycle.clone(),
            },
            None => {
                let dependency = graph
                    .graph
                    .neighbors_directed(node, Incoming)
                    .filter(|dep| leftover.contains(dep))
                    .map(|dep| graph.name(dep))
                    .min()
                    .unwrap_or_default()
                    .to_string();
                ResolveError::DependencyExcluded {
                    plugin: name.clone(),
                    dependency,
                }
            }
        };
        excluded.insert(name, reason);
    }

    PartialResolution {
        order,
        excluded: excluded.into_values().collect(),
    }
}

fn collect<'a>(descriptors: impl IntoIterator<Item = &'a PluginDescriptor>) -> Entries {
    let mut entries = Entries::new();
    for descriptor in descriptors {
        entries.entry(descriptor.name.clone()).or_insert_with(|| Entry {
            priority: descriptor.priority,
            deps: descriptor.dependencies.iter().cloned().collect(),
        });
    }
    entries
}

/// Plugins as nodes, one edge from each dependency to its dependent.
///
/// Nodes are added in name order, so node indices sort like names.
struct DependencyGraph<'a> {
    graph: DiGraph<(&'a str, i32), ()>,
}

impl<'a> DependencyGraph<'a> {
    /// Dependencies missing from `entries` get no edge.
    fn new(entries: &'a Entries) -> Self {
        let mut graph = DiGraph::with_capacity(entries.len(), entries.len());
        let nodes: BTreeMap<&str, NodeIndex> = entries
            .iter()
            .map(|(name, entry)| (name.as_str(), graph.add_node((name.as_str(), entry.priority))))
            .collect();
        for (name, entry) in entries {
            for dep in &entry.deps {
                if let (Some(&from), Some(&to)) = (nodes.get(dep.as_str()), nodes.get(name.as_str())) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        Self { graph }
    }

    fn name(&self, node: NodeIndex) -> &'a str {
        self.graph[node].0
    }

    /// Kahn's algorithm with a priority-then-name ready queue.
    ///
    /// Returns the order and the nodes that could not be ordered, in name
    /// order.
    fn load_order(&self) -> (Vec<String>, Vec<NodeIndex>) {
        let mut pending: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| self.graph.neighbors_directed(node, Incoming).count())
            .collect();
        let mut ready: BTreeSet<(Reverse<i32>, &str, NodeIndex)> = self
            .graph
            .node_indices()
            .filter(|node| pending[node.index()] == 0)
            .map(|node| (Reverse(self.graph[node].1), self.name(node), node))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut placed = vec![false; self.graph.node_count()];
        while let Some((_, name, node)) = ready.pop_first() {
            order.push(name.to_string());
            placed[node.index()] = true;
            for dependent in self.graph.neighbors_directed(node, Outgoing) {
                let count = &mut pending[dependent.index()];
                *count -= 1;
                if *count == 0 {
                    let (name, priority) = self.graph[dependent];
                    ready.insert((Reverse(priority), name, dependent));
                }
            }
        }

        let leftover = self
            .graph
            .node_indices()
            .filter(|node| !placed[node.index()])
            .collect();
        (order, leftover)
    }

    /// Strongly connected groups that contain a cycle.
    fn cycles(&self) -> Vec<Vec<NodeIndex>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|members| match members.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .collect()
    }

    /// Names of `members` in dependency order, starting from the
    /// alphabetically first one. Members a simple walk cannot reach follow
    /// in name order.
    fn cycle(&self, members: &[NodeIndex]) -> Vec<String> {
        let mut unvisited: BTreeSet<(&str, NodeIndex)> =
            members.iter().map(|&node| (self.name(node), node)).collect();
        let mut cycle = Vec::with_capacity(members.len());
        let mut next = unvisited.pop_first();
        while let Some((name, node)) = next {
            cycle.push(name.to_string());
            let step = self
                .graph
                .neighbors_directed(node, Incoming)
                .map(|dep| (self.name(dep), dep))
                .filter(|entry| unvisited.contains(entry))
                .min();
            next = match step {
                Some(entry) => unvisited.take(&entry),
                None => unvisited.pop_first(),
            };
        }
        cycle
    }
}
