//! Graph Topology
//!
//! [`ReactorGraph`] owns every [`GraphNode`] of a runtime and answers
//! questions about propagation: who is refreshed when a node is written,
//! and in which order.
//!
//! # Algorithm
//!
//! `downstream` walks dependents breadth-first from the written node, then
//! orders the visited set topologically (Kahn's algorithm restricted to the
//! visited set) so a node always appears after every visited node it is
//! derived from. This is the order in which synchronous notification reaches
//! them when every derived node has a single source.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use super::node::{GraphNode, NodeId, NodeKind};

/// Arena of graph entries keyed by id.
#[derive(Debug, Default)]
pub struct ReactorGraph {
    /// Insertion ordered so iteration is deterministic.
    nodes: IndexMap<NodeId, GraphNode>,
}

impl ReactorGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
        }
    }

    /// Add an entry for `id`.
    pub fn insert(&mut self, id: NodeId, kind: NodeKind) -> NodeId {
        self.nodes.insert(id, GraphNode::new(id, kind));
        id
    }

    /// Remove a node and every link that mentions it.
    pub fn remove(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.shift_remove(&node_id) {
            for source_id in node.sources() {
                if let Some(source) = self.nodes.get_mut(source_id) {
                    source.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_source(node_id);
                }
            }
        }
    }

    pub fn get(&self, node_id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Record that `derived` is recomputed from `source`.
    pub fn add_edge(&mut self, source: NodeId, derived: NodeId) {
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.add_dependent(derived);
        }
        if let Some(derived_node) = self.nodes.get_mut(&derived) {
            derived_node.add_source(source);
        }
    }

    /// Remove a derivation edge.
    pub fn remove_edge(&mut self, source: NodeId, derived: NodeId) {
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.remove_dependent(derived);
        }
        if let Some(derived_node) = self.nodes.get_mut(&derived) {
            derived_node.remove_source(source);
        }
    }

    /// Link a deep-access child to its parent under `key`.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId, key: &str) {
        self.add_edge(parent, child);
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.set_parent(parent, key);
        }
    }

    /// Every node refreshed, directly or transitively, by a write to
    /// `source_id`, in topological order.
    pub fn downstream(&self, source_id: NodeId) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut reached = Vec::new();
        let mut queue = VecDeque::new();

        if let Some(source) = self.nodes.get(&source_id) {
            queue.extend(source.dependents().iter().copied());
        }

        while let Some(node_id) = queue.pop_front() {
            if !visited.insert(node_id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&node_id) {
                reached.push(node_id);
                queue.extend(node.dependents().iter().copied());
            }
        }

        self.topological_sort(reached)
    }

    /// Order `nodes` so sources come before their dependents.
    fn topological_sort(&self, nodes: Vec<NodeId>) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        for &node_id in &nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .sources()
                    .iter()
                    .filter(|s| node_set.contains(s))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for dependent_id in node.dependents() {
                    if let Some(degree) = in_degree.get_mut(dependent_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(*dependent_id);
                        }
                    }
                }
            }
        }

        result
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
