//! Reactor Graph
//!
//! This module keeps the topology of every live reactor owned by a
//! [`Runtime`](crate::reactive::Runtime): which node a derived value was
//! computed from, which parent a deep-access child belongs to, and who
//! depends on whom.
//!
//! # Overview
//!
//! The graph is an arena keyed by [`NodeId`]. Values do not live here (they
//! are generic and stay in their nodes); only ids and links do. Two kinds of
//! link exist:
//!
//! - derivation edges (`source -> derived`): created by `compute`, `reader`,
//!   `filter`, `when`, `lens` and auto-computed values,
//! - parent links (`parent -> child`): created by deep access. A child's
//!   writes are routed into its parent, and the parent's writes re-derive the
//!   child, so the link is followed downstream only.
//!
//! Keeping links as ids rather than pointers keeps propagation depth
//! inspectable and keeps the derivation graph a DAG: every derived node is
//! created after its source, so no edge can close a cycle.

mod node;
mod topology;

pub use node::{GraphNode, NodeId, NodeKind};
pub use topology::ReactorGraph;
