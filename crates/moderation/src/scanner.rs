//! Document scanner
//!
//! Walks a subtree in document order and hands out candidates in batches.
//! A candidate's node is marked processed as soon as it is handed out, so
//! later scans of the same subtree skip it whether or not classification
//! has finished.

use crate::config::ScanSettings;
use crate::redaction::{within_synthetic, FILTERED_CLASS};
use document::{Document, Marker, NodeId, TreeWalker};

/// Elements whose text is never scanned
pub const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript"];

/// A text node worth classifying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCandidate {
    /// The text node
    pub node: NodeId,
    /// Its value at scan time
    pub text: String,
}

impl TextCandidate {
    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// An image worth classifying
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// The `img` element
    pub element: NodeId,
    /// Its `src` at scan time
    pub src: String,
    /// Rendered width
    pub width: u32,
    /// Rendered height
    pub height: u32,
}

fn in_skipped_element(doc: &Document, node: NodeId) -> bool {
    doc.parent(node)
        .and_then(|parent| doc.tag_name(parent))
        .is_some_and(|tag| SKIPPED_TAGS.contains(&tag))
}

/// Check if a text node should be handed out
fn is_text_candidate(doc: &Document, node: NodeId) -> bool {
    let Some(value) = doc.text(node) else {
        return false;
    };
    !value.trim().is_empty()
        && !doc.has_marker(node, Marker::Processed)
        && !doc.has_marker(node, Marker::Filtered)
        && !in_skipped_element(doc, node)
        && !within_synthetic(doc, node)
}

/// Check if an image should be handed out; returns its source and size
fn image_candidate(doc: &Document, node: NodeId, settings: &ScanSettings) -> Option<ImageCandidate> {
    if doc.tag_name(node) != Some("img")
        || doc.has_marker(node, Marker::Processed)
        || doc.has_marker(node, Marker::Filtered)
        || doc.has_class(node, FILTERED_CLASS)
    {
        return None;
    }

    let src = doc.attribute(node, "src").map(str::trim).unwrap_or_default();
    if src.is_empty() || src.starts_with("data:") {
        return None;
    }

    let (width, height) = doc.dimensions(node);
    if settings.is_icon(width, height) {
        return None;
    }

    Some(ImageCandidate {
        element: node,
        src: src.to_string(),
        width,
        height,
    })
}

/// Batched text scan over a subtree
#[derive(Debug, Clone)]
pub struct TextScan {
    walker: TreeWalker,
    batch_size: usize,
}

impl TextScan {
    /// Scan the descendants of `root`
    pub fn new(root: NodeId, batch_size: usize) -> Self {
        Self {
            walker: TreeWalker::new(root),
            batch_size: batch_size.max(1),
        }
    }

    /// Check if the scan has reached the end of the subtree
    pub fn is_finished(&self) -> bool {
        self.walker.is_finished()
    }

    /// Start over; nodes already handed out stay marked and are skipped
    pub fn restart(&mut self) {
        self.walker.restart();
    }

    /// Next batch of candidates. An empty batch means the scan is finished.
    pub fn next_batch(&mut self, doc: &mut Document) -> Vec<TextCandidate> {
        let mut batch = Vec::new();

        while batch.len() < self.batch_size {
            let Some(node) = self.walker.next_node(doc) else {
                break;
            };
            if !is_text_candidate(doc, node) {
                continue;
            }
            if doc.set_marker(node, Marker::Processed).is_err() {
                continue;
            }
            let text = doc.text(node).unwrap_or_default().to_string();
            batch.push(TextCandidate { node, text });
        }

        batch
    }
}

/// Batched image scan over a subtree
#[derive(Debug, Clone)]
pub struct ImageScan {
    walker: TreeWalker,
    settings: ScanSettings,
}

impl ImageScan {
    /// Scan the descendants of `root`
    pub fn new(root: NodeId, settings: &ScanSettings) -> Self {
        Self {
            walker: TreeWalker::new(root),
            settings: settings.clone(),
        }
    }

    /// Check if the scan has reached the end of the subtree
    pub fn is_finished(&self) -> bool {
        self.walker.is_finished()
    }

    /// Start over; images already handed out stay marked and are skipped
    pub fn restart(&mut self) {
        self.walker.restart();
    }

    /// Next batch of candidates. An empty batch means the scan is finished.
    pub fn next_batch(&mut self, doc: &mut Document) -> Vec<ImageCandidate> {
        let batch_size = self.settings.image_batch_size.max(1);
        let mut batch = Vec::new();

        while batch.len() < batch_size {
            let Some(node) = self.walker.next_node(doc) else {
                break;
            };
            let Some(candidate) = image_candidate(doc, node, &self.settings) else {
                continue;
            };
            if doc.set_marker(node, Marker::Processed).is_err() {
                continue;
            }
            batch.push(candidate);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(doc: &mut Document, parent: NodeId, tag: &str) -> NodeId {
        let id = doc.create_element(tag);
        doc.append_child(parent, id).unwrap();
        id
    }

    fn text(doc: &mut Document, parent: NodeId, value: &str) -> NodeId {
        let id = doc.create_text(value);
        doc.append_child(parent, id).unwrap();
        id
    }

    fn image(doc: &mut Document, parent: NodeId, src: &str, width: u32, height: u32) -> NodeId {
        let id = element(doc, parent, "img");
        doc.set_attribute(id, "src", src).unwrap();
        doc.set_attribute(id, "width", &width.to_string()).unwrap();
        doc.set_attribute(id, "height", &height.to_string()).unwrap();
        id
    }

    #[test]
    fn test_text_scan_skips_scripts_and_whitespace() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let p = element(&mut doc, body, "p");
        let visible = text(&mut doc, p, "hello world");
        text(&mut doc, body, "   \n ");
        let script = element(&mut doc, body, "script");
        text(&mut doc, script, "var explicit = 1;");
        let style = element(&mut doc, body, "style");
        text(&mut doc, style, ".vulgar {}");
        let noscript = element(&mut doc, body, "noscript");
        text(&mut doc, noscript, "enable js");

        let mut scan = TextScan::new(body, 50);
        let batch = scan.next_batch(&mut doc);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].node, visible);
        assert_eq!(batch[0].text, "hello world");
        assert_eq!(batch[0].char_len(), 11);
        assert!(scan.next_batch(&mut doc).is_empty());
        assert!(scan.is_finished());
    }

    #[test]
    fn test_text_scan_batches() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        for i in 0..7 {
            let p = element(&mut doc, body, "p");
            text(&mut doc, p, &format!("paragraph {}", i));
        }

        let mut scan = TextScan::new(body, 3);
        let sizes: Vec<usize> = std::iter::from_fn(|| {
            let batch = scan.next_batch(&mut doc);
            (!batch.is_empty()).then_some(batch.len())
        })
        .collect();

        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_text_scan_marks_processed() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let node = text(&mut doc, body, "some text here");

        let mut first = TextScan::new(body, 50);
        assert_eq!(first.next_batch(&mut doc).len(), 1);
        assert!(doc.has_marker(node, Marker::Processed));

        let mut second = TextScan::new(body, 50);
        assert!(second.next_batch(&mut doc).is_empty());
    }

    #[test]
    fn test_image_scan_filters() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let big = image(&mut doc, body, "https://example.com/big.png", 300, 300);
        image(&mut doc, body, "https://example.com/icon.png", 32, 300);
        image(&mut doc, body, "", 300, 300);
        image(&mut doc, body, "data:image/png;base64,AAAA", 300, 300);
        let filtered = image(&mut doc, body, "https://example.com/f.png", 300, 300);
        doc.add_class(filtered, FILTERED_CLASS).unwrap();

        let mut scan = ImageScan::new(body, &ScanSettings::default());
        let batch = scan.next_batch(&mut doc);

        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].element, big);
        assert_eq!((batch[0].width, batch[0].height), (300, 300));
        assert_eq!(batch[0].src, "https://example.com/big.png");
    }

    #[test]
    fn test_image_scan_batch_size() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        for i in 0..12 {
            image(&mut doc, body, &format!("/img{}.png", i), 120, 120);
        }

        let mut scan = ImageScan::new(body, &ScanSettings::default());
        assert_eq!(scan.next_batch(&mut doc).len(), 10);
        assert_eq!(scan.next_batch(&mut doc).len(), 2);
        assert!(scan.next_batch(&mut doc).is_empty());
    }

    #[test]
    fn test_rescan_finds_only_new_images() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        image(&mut doc, body, "/a.png", 200, 200);

        let mut scan = ImageScan::new(body, &ScanSettings::default());
        assert_eq!(scan.next_batch(&mut doc).len(), 1);

        let div = element(&mut doc, body, "div");
        let added = image(&mut doc, div, "/b.png", 300, 300);

        scan.restart();
        let batch = scan.next_batch(&mut doc);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].element, added);
        assert!(scan.next_batch(&mut doc).is_empty());
    }

    #[test]
    fn test_small_images_are_not_marked() {
        let mut doc = Document::new("https://example.com/");
        let body = doc.body();
        let icon = image(&mut doc, body, "/icon.png", 16, 16);

        let mut scan = ImageScan::new(body, &ScanSettings::default());
        assert!(scan.next_batch(&mut doc).is_empty());
        assert!(!doc.has_marker(icon, Marker::Processed));
    }
}
