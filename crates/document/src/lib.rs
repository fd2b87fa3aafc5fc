//! Document tree for the Socio.io content filter
//!
//! This crate models the live page the content script operates on: an arena
//! of element and text nodes with attributes, inline style, per-node markers,
//! a restartable pre-order walker, and subtree observation that hands out
//! batched mutation records.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mutation;
pub mod node;
pub mod style;
pub mod tree;
pub mod walker;

pub use mutation::{MutationRecord, ObserverId};
pub use node::{Marker, Node, NodeId, NodeKind};
pub use tree::Document;
pub use walker::TreeWalker;

use thiserror::Error;

/// Errors that can occur while manipulating a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Node id does not belong to this document
    #[error("Unknown node: {0:?}")]
    UnknownNode(NodeId),

    /// Operation requires an element node
    #[error("Not an element: {0:?}")]
    NotAnElement(NodeId),

    /// Operation requires a text node
    #[error("Not a text node: {0:?}")]
    NotAText(NodeId),

    /// Reference node is not a child of the given parent
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Expected parent
        parent: NodeId,
        /// Node that was looked up
        child: NodeId,
    },

    /// Insertion would make a node its own ancestor
    #[error("Inserting {0:?} would create a cycle")]
    HierarchyCycle(NodeId),
}

/// Result type for document operations
pub type Result<T> = std::result::Result<T, DocumentError>;
