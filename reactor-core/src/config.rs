//! Runtime Configuration
//!
//! A [`RuntimeConfig`] decides the two policies the reactive core leaves
//! open: what happens when a subscriber writes back into the node that is
//! currently notifying it, and how many such writes one notification loop
//! may absorb before the loop is treated as a cycle. Acyclic derivation
//! chains are never limited.
//!
//! Configuration can be built in code or parsed from a JSON document:
//!
//! ```rust
//! use reactor_core::config::{ReentrancyPolicy, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "reentrancy": "error" }"#).unwrap();
//! assert_eq!(config.reentrancy, ReentrancyPolicy::Error);
//! assert_eq!(config.max_propagation_depth, 64);
//! ```

use serde::Deserialize;

use crate::error::Result;

/// Default bound on queued reentrant writes per notification loop.
pub const DEFAULT_MAX_PROPAGATION_DEPTH: usize = 64;

/// What to do with a write that targets a node while that node is still
/// notifying its subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentrancyPolicy {
    /// Apply the write after the current notification loop finishes.
    /// Queued writes are applied in the order they were made.
    #[default]
    Queue,

    /// Drop the write and log a warning.
    Ignore,

    /// Reject the write with [`ReactorError::ReentrantWrite`](crate::ReactorError::ReentrantWrite).
    Error,
}

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Policy for writes made from inside a node's own notification loop.
    pub reentrancy: ReentrancyPolicy,

    /// Maximum number of queued reentrant writes one notification loop
    /// drains before failing with `PropagationLimit`.
    pub max_propagation_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            reentrancy: ReentrancyPolicy::default(),
            max_propagation_depth: DEFAULT_MAX_PROPAGATION_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder-style override of the reentrancy policy.
    pub fn with_reentrancy(mut self, policy: ReentrancyPolicy) -> Self {
        self.reentrancy = policy;
        self
    }

    /// Builder-style override of the propagation depth.
    pub fn with_max_propagation_depth(mut self, depth: usize) -> Self {
        self.max_propagation_depth = depth;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactorError;

    #[test]
    fn defaults_queue_reentrant_writes() {
        let config = RuntimeConfig::default();
        assert_eq!(config.reentrancy, ReentrancyPolicy::Queue);
        assert_eq!(config.max_propagation_depth, DEFAULT_MAX_PROPAGATION_DEPTH);
    }

    #[test]
    fn parses_partial_documents() {
        let config = RuntimeConfig::from_json(r#"{ "max_propagation_depth": 8 }"#).unwrap();
        assert_eq!(config.reentrancy, ReentrancyPolicy::Queue);
        assert_eq!(config.max_propagation_depth, 8);

        let config = RuntimeConfig::from_json(r#"{ "reentrancy": "ignore" }"#).unwrap();
        assert_eq!(config.reentrancy, ReentrancyPolicy::Ignore);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = RuntimeConfig::from_json(r#"{ "reentrancy": "retry" }"#).unwrap_err();
        assert!(matches!(err, ReactorError::Config(_)));
    }

    #[test]
    fn builder_overrides() {
        let config = RuntimeConfig::default()
            .with_reentrancy(ReentrancyPolicy::Error)
            .with_max_propagation_depth(3);
        assert_eq!(config.reentrancy, ReentrancyPolicy::Error);
        assert_eq!(config.max_propagation_depth, 3);
    }
}
