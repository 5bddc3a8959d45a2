//! Error taxonomy for scene, component and history operations.

use crate::component::ComponentId;
use crate::node::NodeId;
use std::fmt;
use thiserror::Error;

/// The thing a failed lookup was looking for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Node(NodeId),
    /// A node that exists but is not an instance.
    Instance(NodeId),
    Component(ComponentId),
    Slot(String),
    Variant(String),
    /// A node that exists but is not where the operation needs it to be.
    Descendant { ancestor: NodeId, node: NodeId },
    Note { node: NodeId, index: usize },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Node(id) => write!(f, "node {}", id),
            Missing::Instance(id) => write!(f, "instance {}", id),
            Missing::Component(id) => write!(f, "component {}", id),
            Missing::Slot(name) => write!(f, "slot '{}'", name),
            Missing::Variant(key) => write!(f, "variant '{}'", key),
            Missing::Descendant { ancestor, node } => {
                write!(f, "node {} under {}", node, ancestor)
            }
            Missing::Note { node, index } => write!(f, "note {} of node {}", index, node),
        }
    }
}

/// Errors reported by canvas operations.
///
/// Every variant is recoverable: a failed call leaves the document as it was.
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Not found: {0}")]
    NotFound(Missing),
    #[error("Invalid tree operation: {0}")]
    InvalidTree(String),
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("Nothing to restore in history")]
    EmptyHistory,
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CanvasError {
    pub fn node(id: NodeId) -> Self {
        CanvasError::NotFound(Missing::Node(id))
    }

    pub fn component(id: ComponentId) -> Self {
        CanvasError::NotFound(Missing::Component(id))
    }

    pub fn slot(name: impl Into<String>) -> Self {
        CanvasError::NotFound(Missing::Slot(name.into()))
    }

    /// True for the `NotFound` family.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CanvasError::NotFound(_))
    }
}

/// Result type for canvas operations.
pub type CanvasResult<T> = Result<T, CanvasError>;
