//! The document arena and its mutation API

use crate::mutation::{MutationRecord, ObserverId, Registration};
use crate::node::{Marker, Node, NodeId, NodeKind};
use crate::style::{parse_pixels, InlineStyle};
use crate::{DocumentError, Result};

/// A page document
///
/// Nodes live in an arena and are never freed, so a [`NodeId`] stays valid
/// for the lifetime of the document even after the node is detached. The
/// `body` element is the root every connected node descends from.
#[derive(Debug)]
pub struct Document {
    url: String,
    nodes: Vec<Node>,
    body: NodeId,
    observers: Vec<Option<Registration>>,
}

impl Document {
    /// Create an empty document for a page URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            nodes: vec![Node::new_element("body")],
            body: NodeId(0),
            observers: Vec::new(),
        }
    }

    /// Page URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The body element
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    fn get(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id.0).ok_or(DocumentError::UnknownNode(id))
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Node::new_element(tag));
        NodeId(self.nodes.len() - 1)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, value: &str) -> NodeId {
        self.nodes.push(Node::new_text(value));
        NodeId(self.nodes.len() - 1)
    }

    // =========================================================================
    // Tree structure
    // =========================================================================

    /// Parent of a node
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children of a node (empty for unknown ids)
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Next sibling of a node
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|c| *c == id)?;
        siblings.get(position + 1).copied()
    }

    /// Check if `ancestor` is `node` or one of its ancestors
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Check if the node is attached under the body
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.node(id).is_some() && self.contains(self.body, id)
    }

    /// Append a child, moving it from its current parent if needed
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insert(parent, child)?;
        self.detach(child);
        self.get_mut(parent)?.children.push(child);
        self.get_mut(child)?.parent = Some(parent);
        self.record(MutationRecord::added(parent, child));
        Ok(())
    }

    /// Insert `child` before `reference`, which must be a child of `parent`
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.check_insert(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(DocumentError::NotAChild { parent, child: reference });
        }
        if child == reference {
            return Ok(());
        }

        self.detach(child);

        let siblings = &mut self.get_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|c| *c == reference)
            .ok_or(DocumentError::NotAChild { parent, child: reference })?;
        siblings.insert(position, child);

        self.get_mut(child)?.parent = Some(parent);
        self.record(MutationRecord::added(parent, child));
        Ok(())
    }

    /// Remove a child from its parent
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.parent(child) != Some(parent) {
            return Err(DocumentError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    /// Detach a node from its parent; no-op for detached nodes
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };

        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.retain(|c| *c != id);
        }
        if let Some(n) = self.nodes.get_mut(id.0) {
            n.parent = None;
        }
        self.record(MutationRecord::removed(parent, id));
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<()> {
        if !self.get(parent)?.is_element() {
            return Err(DocumentError::NotAnElement(parent));
        }
        self.get(child)?;
        if self.contains(child, parent) {
            return Err(DocumentError::HierarchyCycle(child));
        }
        Ok(())
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Tag name of an element
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(Node::tag)
    }

    /// Value of a text node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(Node::text)
    }

    /// Replace the value of a text node
    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<()> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Text(current) => {
                *current = value.to_string();
                Ok(())
            }
            NodeKind::Element { .. } => Err(DocumentError::NotAText(id)),
        }
    }

    /// Concatenated text of all descendant text nodes
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(value) => out.push_str(value),
            NodeKind::Element { .. } => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Descendant elements with the given tag, in document order.
    /// The root itself is not included.
    pub fn descendants_by_tag(&self, root: NodeId, tag: &str) -> Vec<NodeId> {
        let tag = tag.to_ascii_lowercase();
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            if self.tag_name(id) == Some(tag.as_str()) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }

        found
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Get an attribute
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.node(id).map(Node::kind) {
            Some(NodeKind::Element { attributes, .. }) => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.insert(name.to_ascii_lowercase(), value.to_string());
                Ok(())
            }
            NodeKind::Text(_) => Err(DocumentError::NotAnElement(id)),
        }
    }

    /// Remove an attribute
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        match &mut self.get_mut(id)?.kind {
            NodeKind::Element { attributes, .. } => {
                attributes.remove(name);
                Ok(())
            }
            NodeKind::Text(_) => Err(DocumentError::NotAnElement(id)),
        }
    }

    /// Check if an element has a class
    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Add a class to an element
    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        if self.has_class(id, class) {
            return Ok(());
        }
        let value = match self.attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attribute(id, "class", &value)
    }

    /// Remove a class from an element
    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        let Some(existing) = self.attribute(id, "class") else {
            return Ok(());
        };
        let remaining = existing
            .split_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");

        if remaining.is_empty() {
            self.remove_attribute(id, "class")
        } else {
            self.set_attribute(id, "class", &remaining)
        }
    }

    /// Get an inline style property
    pub fn style_property(&self, id: NodeId, name: &str) -> Option<String> {
        let style = InlineStyle::parse(self.attribute(id, "style")?);
        style.get(name).map(str::to_string)
    }

    /// Set an inline style property; an empty value removes it
    pub fn set_style_property(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let mut style = InlineStyle::parse(self.attribute(id, "style").unwrap_or_default());
        style.set(name, value);

        if style.is_empty() {
            self.remove_attribute(id, "style")
        } else {
            self.set_attribute(id, "style", &style.to_attribute())
        }
    }

    /// Rendered size of an element, taken from its `width`/`height`
    /// attributes and falling back to inline style
    pub fn dimensions(&self, id: NodeId) -> (u32, u32) {
        let measure = |name: &str| {
            self.attribute(id, name)
                .and_then(parse_pixels)
                .or_else(|| self.style_property(id, name).as_deref().and_then(parse_pixels))
                .unwrap_or(0)
        };
        (measure("width"), measure("height"))
    }

    // =========================================================================
    // Markers
    // =========================================================================

    /// Check if a node carries a marker
    pub fn has_marker(&self, id: NodeId, marker: Marker) -> bool {
        self.node(id).map(|n| n.has_marker(marker)).unwrap_or(false)
    }

    /// Attach a marker to a node
    pub fn set_marker(&mut self, id: NodeId, marker: Marker) -> Result<()> {
        let node = self.get_mut(id)?;
        if !node.markers.contains(&marker) {
            node.markers.push(marker);
        }
        Ok(())
    }

    /// Remove a marker from a node
    pub fn clear_marker(&mut self, id: NodeId, marker: Marker) -> Result<()> {
        self.get_mut(id)?.markers.retain(|m| *m != marker);
        Ok(())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Start observing child-list changes in the subtree rooted at `root`
    pub fn observe(&mut self, root: NodeId) -> ObserverId {
        self.observers.push(Some(Registration {
            root,
            pending: Vec::new(),
        }));
        ObserverId(self.observers.len() - 1)
    }

    /// Stop observing and drop any undelivered records
    pub fn disconnect(&mut self, observer: ObserverId) {
        if let Some(slot) = self.observers.get_mut(observer.0) {
            *slot = None;
        }
    }

    /// Take the records queued for an observer since the last call
    pub fn take_records(&mut self, observer: ObserverId) -> Vec<MutationRecord> {
        self.observers
            .get_mut(observer.0)
            .and_then(Option::as_mut)
            .map(|registration| std::mem::take(&mut registration.pending))
            .unwrap_or_default()
    }

    fn record(&mut self, record: MutationRecord) {
        if self.observers.iter().all(Option::is_none) {
            return;
        }

        let roots: Vec<(usize, NodeId)> = self
            .observers
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|r| (i, r.root)))
            .collect();

        for (slot, root) in roots {
            if self.contains(root, record.target) {
                if let Some(Some(registration)) = self.observers.get_mut(slot) {
                    registration.pending.push(record.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new("https://example.com/page");
        let body = doc.body();
        let div = doc.create_element("DIV");
        let text = doc.create_text("hello");
        let img = doc.create_element("img");
        doc.append_child(body, div).unwrap();
        doc.append_child(div, text).unwrap();
        doc.append_child(div, img).unwrap();
        (doc, div, text, img)
    }

    #[test]
    fn test_append_and_structure() {
        let (doc, div, text, img) = sample();
        assert_eq!(doc.tag_name(div), Some("div"));
        assert_eq!(doc.children(div), &[text, img]);
        assert_eq!(doc.parent(img), Some(div));
        assert_eq!(doc.next_sibling(text), Some(img));
        assert!(doc.is_connected(img));
    }

    #[test]
    fn test_insert_before_moves_node() {
        let (mut doc, div, text, img) = sample();
        let wrapper = doc.create_element("div");

        doc.insert_before(div, wrapper, img).unwrap();
        doc.append_child(wrapper, img).unwrap();

        assert_eq!(doc.children(div), &[text, wrapper]);
        assert_eq!(doc.children(wrapper), &[img]);
        assert_eq!(doc.parent(img), Some(wrapper));
    }

    #[test]
    fn test_insert_before_requires_child_reference() {
        let (mut doc, div, _text, _img) = sample();
        let stray = doc.create_element("span");
        let other = doc.create_element("span");

        let result = doc.insert_before(div, stray, other);
        assert!(matches!(result, Err(DocumentError::NotAChild { .. })));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut doc, div, _text, _img) = sample();
        let body = doc.body();
        assert_eq!(doc.append_child(div, body), Err(DocumentError::HierarchyCycle(body)));
    }

    #[test]
    fn test_detached_node_not_connected() {
        let (mut doc, div, text, _img) = sample();
        doc.remove_child(div, text).unwrap();
        assert!(!doc.is_connected(text));
        assert_eq!(doc.text(text), Some("hello"));
    }

    #[test]
    fn test_text_only_on_text_nodes() {
        let (mut doc, div, text, _img) = sample();
        assert_eq!(doc.text(text), Some("hello"));
        assert_eq!(doc.text(div), None);
        assert_eq!(doc.node(text).and_then(Node::text), Some("hello"));

        doc.set_text(text, "bye").unwrap();
        assert_eq!(doc.text(text), Some("bye"));
        assert!(doc.set_text(div, "nope").is_err());
    }

    #[test]
    fn test_text_content_and_query() {
        let (mut doc, div, _text, img) = sample();
        let span = doc.create_element("span");
        let more = doc.create_text(" world");
        doc.append_child(div, span).unwrap();
        doc.append_child(span, more).unwrap();

        assert_eq!(doc.text_content(div), "hello world");
        assert_eq!(doc.descendants_by_tag(doc.body(), "IMG"), vec![img]);
        assert!(doc.descendants_by_tag(img, "img").is_empty());
    }

    #[test]
    fn test_classes() {
        let (mut doc, _div, _text, img) = sample();
        doc.add_class(img, "a").unwrap();
        doc.add_class(img, "b").unwrap();
        doc.add_class(img, "a").unwrap();
        assert_eq!(doc.attribute(img, "class"), Some("a b"));

        doc.remove_class(img, "a").unwrap();
        assert!(!doc.has_class(img, "a"));
        doc.remove_class(img, "b").unwrap();
        assert_eq!(doc.attribute(img, "class"), None);
    }

    #[test]
    fn test_style_properties() {
        let (mut doc, _div, _text, img) = sample();
        doc.set_attribute(img, "style", "margin: 4px").unwrap();
        doc.set_style_property(img, "filter", "blur(25px)").unwrap();
        assert_eq!(doc.attribute(img, "style"), Some("margin: 4px; filter: blur(25px)"));

        doc.set_style_property(img, "filter", "").unwrap();
        doc.set_style_property(img, "margin", "").unwrap();
        assert_eq!(doc.attribute(img, "style"), None);
    }

    #[test]
    fn test_dimensions() {
        let (mut doc, _div, _text, img) = sample();
        assert_eq!(doc.dimensions(img), (0, 0));

        doc.set_attribute(img, "width", "300").unwrap();
        doc.set_attribute(img, "style", "height: 120px").unwrap();
        assert_eq!(doc.dimensions(img), (300, 120));
    }

    #[test]
    fn test_markers() {
        let (mut doc, _div, text, _img) = sample();
        assert!(!doc.has_marker(text, Marker::Processed));
        doc.set_marker(text, Marker::Processed).unwrap();
        doc.set_marker(text, Marker::Processed).unwrap();
        assert!(doc.has_marker(text, Marker::Processed));
        doc.clear_marker(text, Marker::Processed).unwrap();
        assert!(!doc.has_marker(text, Marker::Processed));
    }

    #[test]
    fn test_observation_batches_records() {
        let (mut doc, div, _text, _img) = sample();
        let observer = doc.observe(doc.body());

        let added = doc.create_element("p");
        doc.append_child(div, added).unwrap();
        doc.remove_child(div, added).unwrap();

        let records = doc.take_records(observer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].added_nodes, vec![added]);
        assert_eq!(records[1].removed_nodes, vec![added]);
        assert!(doc.take_records(observer).is_empty());
    }

    #[test]
    fn test_observation_scoped_to_subtree() {
        let (mut doc, div, _text, _img) = sample();
        let observer = doc.observe(div);

        let outside = doc.create_element("p");
        doc.append_child(doc.body(), outside).unwrap();
        assert!(doc.take_records(observer).is_empty());

        doc.disconnect(observer);
        let inside = doc.create_element("p");
        doc.append_child(div, inside).unwrap();
        assert!(doc.take_records(observer).is_empty());
    }
}
