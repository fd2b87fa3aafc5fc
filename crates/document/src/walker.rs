//! Restartable pre-order traversal
//!
//! The walker does not borrow the document between steps, so a caller can
//! pull a batch of nodes, release the document, yield to the scheduler and
//! resume where it stopped.

use crate::node::NodeId;
use crate::tree::Document;

/// Pre-order walker over the descendants of a root node
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: NodeId,
    current: Option<NodeId>,
    finished: bool,
}

impl TreeWalker {
    /// Create a walker over the descendants of `root` (the root itself is
    /// not visited)
    pub fn new(root: NodeId) -> Self {
        Self {
            root,
            current: None,
            finished: false,
        }
    }

    /// Root of the traversal
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Check if the traversal has ended
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Start over from the root
    pub fn restart(&mut self) {
        self.current = None;
        self.finished = false;
    }

    /// Advance to the next node in document order
    pub fn next_node(&mut self, doc: &Document) -> Option<NodeId> {
        if self.finished {
            return None;
        }

        let next = match self.current {
            None => doc.children(self.root).first().copied(),
            Some(current) => {
                if !doc.contains(self.root, current) {
                    // The node we stopped on was moved out of the subtree
                    tracing::debug!("Walker position left the subtree, ending traversal");
                    None
                } else {
                    self.successor(doc, current)
                }
            }
        };

        match next {
            Some(id) => self.current = Some(id),
            None => self.finished = true,
        }
        next
    }

    fn successor(&self, doc: &Document, current: NodeId) -> Option<NodeId> {
        if let Some(first) = doc.children(current).first() {
            return Some(*first);
        }

        let mut node = current;
        loop {
            if node == self.root {
                return None;
            }
            if let Some(sibling) = doc.next_sibling(node) {
                return Some(sibling);
            }
            node = doc.parent(node)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build() -> (Document, Vec<NodeId>) {
        // body > [div > [t1, span > [t2]], t3]
        let mut doc = Document::new("https://example.com");
        let body = doc.body();
        let div = doc.create_element("div");
        let t1 = doc.create_text("one");
        let span = doc.create_element("span");
        let t2 = doc.create_text("two");
        let t3 = doc.create_text("three");
        doc.append_child(body, div).unwrap();
        doc.append_child(div, t1).unwrap();
        doc.append_child(div, span).unwrap();
        doc.append_child(span, t2).unwrap();
        doc.append_child(body, t3).unwrap();
        (doc, vec![div, t1, span, t2, t3])
    }

    fn collect(doc: &Document, walker: &mut TreeWalker) -> Vec<NodeId> {
        let mut out = Vec::new();
        while let Some(id) = walker.next_node(doc) {
            out.push(id);
        }
        out
    }

    #[test]
    fn test_preorder() {
        let (doc, order) = build();
        let mut walker = TreeWalker::new(doc.body());
        assert_eq!(collect(&doc, &mut walker), order);
        assert!(walker.is_finished());
        assert_eq!(walker.next_node(&doc), None);
    }

    #[test]
    fn test_restart() {
        let (doc, order) = build();
        let mut walker = TreeWalker::new(doc.body());
        walker.next_node(&doc);
        walker.next_node(&doc);
        walker.restart();
        assert_eq!(collect(&doc, &mut walker), order);
    }

    #[test]
    fn test_subtree_only() {
        let (doc, order) = build();
        let mut walker = TreeWalker::new(order[0]);
        assert_eq!(collect(&doc, &mut walker), vec![order[1], order[2], order[3]]);
    }

    #[test]
    fn test_resumes_after_mutation() {
        let (mut doc, order) = build();
        let mut walker = TreeWalker::new(doc.body());
        assert_eq!(walker.next_node(&doc), Some(order[0]));
        assert_eq!(walker.next_node(&doc), Some(order[1]));

        let late = doc.create_text("late");
        doc.append_child(order[2], late).unwrap();

        let rest = collect(&doc, &mut walker);
        assert_eq!(rest, vec![order[2], order[3], late, order[4]]);
    }

    #[test]
    fn test_empty_root() {
        let mut doc = Document::new("https://example.com");
        let lonely = doc.create_element("div");
        let mut walker = TreeWalker::new(lonely);
        assert_eq!(walker.next_node(&doc), None);
        assert!(walker.is_finished());
    }
}
