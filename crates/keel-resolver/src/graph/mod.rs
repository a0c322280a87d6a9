//! Feature dependency graph using petgraph
//!
//! Nodes are closure members keyed by lowercased symbolic name; an edge
//! points from a feature to a dependency it declared. Cycles are legal, so
//! install ordering works on strongly connected components.

use std::collections::HashMap;

use keel_core::types::FeatureId;
use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// Node in the feature graph
#[derive(Debug, Clone)]
pub struct FeatureNode {
    pub key: String,
    pub id: FeatureId,
    /// Position in breadth-first discovery order
    pub discovered: usize,
}

#[derive(Debug, Default)]
pub struct FeatureGraph {
    graph: DiGraph<FeatureNode, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl FeatureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature node; adding the same key twice is a no-op
    pub fn add_feature(&mut self, id: FeatureId) -> NodeIndex {
        let key = id.symbolic_name.to_ascii_lowercase();
        if let Some(&index) = self.node_map.get(&key) {
            return index;
        }
        let discovered = self.graph.node_count();
        let index = self.graph.add_node(FeatureNode {
            key: key.clone(),
            id,
            discovered,
        });
        self.node_map.insert(key, index);
        index
    }

    /// Record that `from` depends on `to`; unknown keys are ignored
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        let (Some(&from), Some(&to)) = (
            self.node_map.get(&from.to_ascii_lowercase()),
            self.node_map.get(&to.to_ascii_lowercase()),
        ) else {
            return;
        };
        if self.graph.find_edge(from, to).is_none() {
            self.graph.add_edge(from, to, ());
        }
    }

    /// Direct dependencies of a feature, in discovery order
    pub fn dependencies(&self, key: &str) -> Vec<&FeatureNode> {
        let Some(&index) = self.node_map.get(&key.to_ascii_lowercase()) else {
            return Vec::new();
        };
        let mut nodes: Vec<&FeatureNode> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|n| &self.graph[n])
            .collect();
        nodes.sort_by_key(|node| node.discovered);
        nodes
    }

    /// Dependency-first install order.
    ///
    /// Components come out of Kosaraju in reverse topological order, which
    /// for dependent -> dependency edges puts dependencies first. Members of
    /// one cycle keep their discovery order.
    pub fn install_order(&self) -> Vec<&FeatureNode> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .flat_map(|mut component| {
                component.sort_by_key(|&index| self.graph[index].discovered);
                component
            })
            .map(|index| &self.graph[index])
            .collect()
    }

    /// Dependency cycles, each listed in discovery order
    pub fn cycles(&self) -> Vec<Vec<&FeatureNode>> {
        kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self.graph.find_edge(component[0], component[0]).is_some()
            })
            .map(|mut component| {
                component.sort_by_key(|&index| self.graph[index].discovered);
                component.into_iter().map(|index| &self.graph[index]).collect()
            })
            .collect()
    }

    /// Format a cycle as "a -> b -> a"
    pub fn format_cycle(cycle: &[&FeatureNode]) -> String {
        let mut names: Vec<&str> = cycle.iter().map(|node| node.id.short_name.as_str()).collect();
        if let Some(first) = names.first().copied() {
            names.push(first);
        }
        names.join(" -> ")
    }
}
