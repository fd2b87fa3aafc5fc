//! Structural change records
//!
//! Observers register a subtree root. Every child-list change whose target
//! lies inside that subtree is queued for the observer until it takes the
//! batch, the same delivery shape a DOM `MutationObserver` has.

use crate::node::NodeId;

/// Handle returned by [`crate::Document::observe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) usize);

/// One child-list change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Node whose children changed
    pub target: NodeId,
    /// Nodes inserted under the target
    pub added_nodes: Vec<NodeId>,
    /// Nodes removed from the target
    pub removed_nodes: Vec<NodeId>,
}

impl MutationRecord {
    pub(crate) fn added(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added_nodes: vec![node],
            removed_nodes: Vec::new(),
        }
    }

    pub(crate) fn removed(target: NodeId, node: NodeId) -> Self {
        Self {
            target,
            added_nodes: Vec::new(),
            removed_nodes: vec![node],
        }
    }
}

#[derive(Debug)]
pub(crate) struct Registration {
    pub(crate) root: NodeId,
    pub(crate) pending: Vec<MutationRecord>,
}
