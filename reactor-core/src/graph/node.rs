//! Graph Nodes
//!
//! This module defines the entries that live in the reactor graph.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a reactor node.
///
/// Ids are process-unique and double as the identity of a handle: two
/// handles are "the same reactor" exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a node came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Created directly by the runtime. Roots of the graph.
    Source,

    /// Recomputed from one or more sources (compute, filter, when, computed).
    Derived,

    /// Read-only mirror of a source.
    Reader,

    /// Independent copy taken at one instant (freeze, copy).
    Snapshot,

    /// Deep-access child of another node, keyed by property name.
    Child,

    /// Typed projection of another node.
    Lens,
}

/// A node's entry in the reactor graph.
#[derive(Debug)]
pub struct GraphNode {
    id: NodeId,
    kind: NodeKind,

    /// Deep-access parent and the property this node mirrors.
    parent: Option<(NodeId, String)>,

    /// Nodes this node is derived from.
    sources: HashSet<NodeId>,

    /// Nodes that must be refreshed when this node is written:
    /// derived nodes and deep-access children.
    dependents: HashSet<NodeId>,
}

impl GraphNode {
    /// Create an entry for an existing node id.
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            sources: HashSet::new(),
            dependents: HashSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Deep-access parent and key, if this is a child node.
    pub fn parent(&self) -> Option<(NodeId, &str)> {
        self.parent.as_ref().map(|(id, key)| (*id, key.as_str()))
    }

    pub(crate) fn set_parent(&mut self, parent: NodeId, key: impl Into<String>) {
        self.parent = Some((parent, key.into()));
    }

    pub(crate) fn add_source(&mut self, node_id: NodeId) {
        self.sources.insert(node_id);
    }

    pub(crate) fn remove_source(&mut self, node_id: NodeId) {
        self.sources.remove(&node_id);
    }

    /// Nodes this node is derived from.
    pub fn sources(&self) -> &HashSet<NodeId> {
        &self.sources
    }

    pub(crate) fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    pub(crate) fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.remove(&node_id);
    }

    /// Nodes refreshed by a write to this node.
    pub fn dependents(&self) -> &HashSet<NodeId> {
        &self.dependents
    }
}
