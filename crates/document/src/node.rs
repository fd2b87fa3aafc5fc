//! Node types stored in the document arena

use std::collections::BTreeMap;

/// Stable handle to a node in a [`crate::Document`]
///
/// Ids are never reused within a document, so a handle held across an await
/// point either still names the same node or names a detached one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Bookkeeping flags the filter attaches to nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// Node has been examined by a scan pass
    Processed,
    /// Node currently carries a redaction
    Filtered,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Element with a lowercase tag name and its attributes
    Element {
        /// Tag name, lowercase
        tag: String,
        /// Attributes in name order
        attributes: BTreeMap<String, String>,
    },
    /// Text node
    Text(String),
}

/// A node in the document arena
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) markers: Vec<Marker>,
}

impl Node {
    pub(crate) fn new_element(tag: &str) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
                attributes: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub(crate) fn new_text(value: &str) -> Self {
        Self {
            kind: NodeKind::Text(value.to_string()),
            parent: None,
            children: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// Node payload
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in document order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Check if this is an element
    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    /// Check if this is a text node
    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text(_))
    }

    /// Tag name for elements
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            NodeKind::Text(_) => None,
        }
    }

    /// Value of a text node
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(value) => Some(value),
            NodeKind::Element { .. } => None,
        }
    }

    /// Check if the node carries a marker
    pub fn has_marker(&self, marker: Marker) -> bool {
        self.markers.contains(&marker)
    }
}
