//! Error types for the reactive core.
//!
//! Every failure in this crate is synchronous and local: a write that is not
//! allowed, a deep access into something that has no properties, or a
//! propagation chain that would never settle. They are all surfaced to the
//! caller immediately as a [`ReactorError`].

use thiserror::Error;

use crate::graph::NodeId;

/// Errors produced by reactive handles, the runtime and its configuration.
#[derive(Debug, Error)]
pub enum ReactorError {
    /// A write was attempted on a read-only handle (reader, frozen snapshot,
    /// derived value).
    #[error("reactor {node} is read-only")]
    ReadOnly { node: NodeId },

    /// A one-shot handle has already received its single write.
    #[error("reactor {node} was already written once and is now read-only")]
    AlreadyWritten { node: NodeId },

    /// Deep access descended into a value that has no properties.
    #[error("cannot read property `{property}` of {value}")]
    NotAnObject { property: String, value: String },

    /// A write through an array index that is neither an existing element nor
    /// the slot right after the last one.
    #[error("index `{index}` is out of range for an array of length {len}")]
    IndexOutOfRange { index: String, len: usize },

    /// A subscriber wrote back into the node that is notifying it while the
    /// runtime is configured to reject reentrant writes.
    #[error("reentrant write to reactor {node} during its own notification")]
    ReentrantWrite { node: NodeId },

    /// Reentrant writes kept feeding a node past the configured limit.
    #[error("propagation through reactor {node} did not settle after {depth} queued writes")]
    PropagationLimit { node: NodeId, depth: usize },

    /// The runtime configuration document could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReactorError>;

impl ReactorError {
    /// True for the write-rejection variants (read-only and one-shot).
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            ReactorError::ReadOnly { .. } | ReactorError::AlreadyWritten { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_property() {
        let err = ReactorError::NotAnObject {
            property: "name".to_string(),
            value: "42".to_string(),
        };
        assert_eq!(err.to_string(), "cannot read property `name` of 42");
        assert!(!err.is_read_only());
    }

    #[test]
    fn write_rejections_are_read_only() {
        let node = NodeId::from(7);
        assert!(ReactorError::ReadOnly { node }.is_read_only());
        assert!(ReactorError::AlreadyWritten { node }.is_read_only());
        assert!(!ReactorError::ReentrantWrite { node }.is_read_only());
    }
}
