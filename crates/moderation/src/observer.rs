//! Change observer
//!
//! Turns a batch of structural change records into at most one text scan
//! and one image scan.

use crate::redaction::within_synthetic;
use document::{Document, MutationRecord, NodeId, ObserverId};

/// Which scans a batch of changes calls for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTrigger {
    /// Rescan text
    pub text: bool,
    /// Rescan images
    pub images: bool,
}

impl ScanTrigger {
    /// Check if no scan is needed
    pub fn is_empty(&self) -> bool {
        !self.text && !self.images
    }

    /// Drop the scans a configuration has turned off
    pub fn masked(self, filter_text: bool, filter_images: bool) -> Self {
        Self {
            text: self.text && filter_text,
            images: self.images && filter_images,
        }
    }
}

/// Decide which scans a batch of records calls for
///
/// Only connected element nodes count. Nodes created by the redaction
/// engine, or moved into its wrappers, are ignored.
pub fn evaluate(doc: &Document, records: &[MutationRecord]) -> ScanTrigger {
    let mut trigger = ScanTrigger::default();

    for node in records.iter().flat_map(|r| r.added_nodes.iter().copied()) {
        if trigger.text && trigger.images {
            break;
        }
        if !doc.node(node).is_some_and(|n| n.is_element())
            || !doc.is_connected(node)
            || within_synthetic(doc, node)
        {
            continue;
        }

        if !trigger.text && !doc.text_content(node).trim().is_empty() {
            trigger.text = true;
        }
        if !trigger.images
            && (doc.tag_name(node) == Some("img") || !doc.descendants_by_tag(node, "img").is_empty())
        {
            trigger.images = true;
        }
    }

    trigger
}

/// Subscription to structural changes under a root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeObserver {
    id: ObserverId,
    root: NodeId,
}

impl ChangeObserver {
    /// Start observing `root`
    pub fn attach(doc: &mut Document, root: NodeId) -> Self {
        let id = doc.observe(root);
        tracing::debug!("Observing changes under {:?}", root);
        Self { id, root }
    }

    /// Observed root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Take pending records and decide which scans they call for
    pub fn poll(&self, doc: &mut Document) -> ScanTrigger {
        let records = doc.take_records(self.id);
        if records.is_empty() {
            return ScanTrigger::default();
        }
        let trigger = evaluate(doc, &records);
        tracing::debug!("{} change records -> {:?}", records.len(), trigger);
        trigger
    }

    /// Stop observing
    pub fn detach(self, doc: &mut Document) {
        doc.disconnect(self.id);
    }
}
