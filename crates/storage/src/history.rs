//! Filtering statistics and per-domain history

use crate::config::FilterConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of content a redaction applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// A text node
    Text,
    /// An image element
    Image,
}

impl ContentKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running totals shown in the popup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    /// Text nodes filtered
    #[serde(default)]
    pub text_filtered: u64,
    /// Images filtered
    #[serde(default)]
    pub images_filtered: u64,
}

impl FilterStats {
    /// Count one filtering event
    pub fn increment(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Text => self.text_filtered += 1,
            ContentKind::Image => self.images_filtered += 1,
        }
    }

    /// Total across kinds
    pub fn total(&self) -> u64 {
        self.text_filtered + self.images_filtered
    }
}

/// One history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the content was filtered
    pub timestamp: DateTime<Utc>,
    /// Original content (text, or image source)
    pub content: String,
    /// What replaced it
    pub replacement: String,
    /// Whether the user recovered it
    #[serde(default)]
    pub recovered: bool,
}

/// History for one domain, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainHistory {
    /// Text entries in report order
    #[serde(default)]
    pub text: Vec<HistoryEntry>,
    /// Image entries in report order
    #[serde(default)]
    pub images: Vec<HistoryEntry>,
}

impl DomainHistory {
    /// Entries of one kind
    pub fn entries(&self, kind: ContentKind) -> &[HistoryEntry] {
        match kind {
            ContentKind::Text => &self.text,
            ContentKind::Image => &self.images,
        }
    }

    /// Mutable entries of one kind
    pub fn entries_mut(&mut self, kind: ContentKind) -> &mut Vec<HistoryEntry> {
        match kind {
            ContentKind::Text => &mut self.text,
            ContentKind::Image => &mut self.images,
        }
    }

    /// Total number of entries
    pub fn len(&self) -> usize {
        self.text.len() + self.images.len()
    }

    /// Check if there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything the background store persists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionState {
    /// Filter configuration
    #[serde(default)]
    pub config: FilterConfig,
    /// Statistics
    #[serde(default)]
    pub stats: FilterStats,
    /// History keyed by hostname
    #[serde(default)]
    pub history: BTreeMap<String, DomainHistory>,
}
