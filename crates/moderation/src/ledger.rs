//! Recovery ledger
//!
//! Every redaction applied to the page is recorded here under an index that
//! is unique per content kind. Indices keep counting across resets, so an
//! index handed out before a reset can be told apart from one that never
//! existed.

use crate::redaction::{ImageRedaction, RedactionEngine};
use document::{Document, DocumentError, NodeId};
use storage::ContentKind;
use thiserror::Error;

/// Ledger errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// No record was ever issued under this index
    #[error("No {kind} redaction with index {index}")]
    NotFound {
        /// Content kind
        kind: ContentKind,
        /// Requested index
        index: usize,
    },

    /// The record was dropped by a ledger reset
    #[error("{kind} redaction {index} belongs to an earlier filtering pass")]
    Stale {
        /// Content kind
        kind: ContentKind,
        /// Requested index
        index: usize,
    },

    /// The record was already recovered
    #[error("{kind} redaction {index} was already recovered")]
    AlreadyRecovered {
        /// Content kind
        kind: ContentKind,
        /// Requested index
        index: usize,
    },

    /// The page changed the redacted text since it was filtered
    #[error("{kind} redaction {index} was replaced by the page")]
    Replaced {
        /// Content kind
        kind: ContentKind,
        /// Requested index
        index: usize,
    },

    /// Restoring the page failed
    #[error("Failed to restore content: {0}")]
    Document(#[from] DocumentError),
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// What a redaction touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedactionTarget {
    /// A rewritten text node
    Text {
        /// The text node
        node: NodeId,
    },
    /// A wrapped image
    Image(ImageRedaction),
}

impl RedactionTarget {
    /// Content kind of the target
    pub fn kind(&self) -> ContentKind {
        match self {
            RedactionTarget::Text { .. } => ContentKind::Text,
            RedactionTarget::Image(_) => ContentKind::Image,
        }
    }

    /// The page node the redaction applies to
    pub fn node(&self) -> NodeId {
        match self {
            RedactionTarget::Text { node } => *node,
            RedactionTarget::Image(redaction) => redaction.image,
        }
    }
}

/// One applied redaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionRecord {
    /// Index within its kind
    pub index: usize,
    /// Content kind
    pub kind: ContentKind,
    /// Content before redaction (text, or image source)
    pub original_value: String,
    /// Content after redaction
    pub applied_value: String,
    /// Page state needed to undo the redaction
    pub target: RedactionTarget,
    /// Set once by recovery
    pub recovered: bool,
}

#[derive(Debug, Default)]
struct KindLog {
    base: usize,
    records: Vec<RedactionRecord>,
}

impl KindLog {
    fn next_index(&self) -> usize {
        self.base + self.records.len()
    }

    fn position(&self, kind: ContentKind, index: usize) -> Result<usize> {
        if index < self.base {
            return Err(LedgerError::Stale { kind, index });
        }
        let position = index - self.base;
        if position >= self.records.len() {
            return Err(LedgerError::NotFound { kind, index });
        }
        Ok(position)
    }

    fn reset(&mut self) {
        self.base = self.next_index();
        self.records.clear();
    }
}

/// In-memory ledger of the redactions applied to one page
#[derive(Debug, Default)]
pub struct RecoveryLedger {
    text: KindLog,
    images: KindLog,
}

impl RecoveryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, kind: ContentKind) -> &KindLog {
        match kind {
            ContentKind::Text => &self.text,
            ContentKind::Image => &self.images,
        }
    }

    fn log_mut(&mut self, kind: ContentKind) -> &mut KindLog {
        match kind {
            ContentKind::Text => &mut self.text,
            ContentKind::Image => &mut self.images,
        }
    }

    /// Record a redaction and return its index
    pub fn record(
        &mut self,
        original_value: impl Into<String>,
        applied_value: impl Into<String>,
        target: RedactionTarget,
    ) -> usize {
        let kind = target.kind();
        let log = self.log_mut(kind);
        let index = log.next_index();

        log.records.push(RedactionRecord {
            index,
            kind,
            original_value: original_value.into(),
            applied_value: applied_value.into(),
            target,
            recovered: false,
        });
        index
    }

    /// Look up a record
    pub fn get(&self, kind: ContentKind, index: usize) -> Result<&RedactionRecord> {
        let log = self.log(kind);
        let position = log.position(kind, index)?;
        Ok(&log.records[position])
    }

    /// Records of one kind in index order
    pub fn records(&self, kind: ContentKind) -> &[RedactionRecord] {
        &self.log(kind).records
    }

    /// Number of live records of one kind
    pub fn len(&self, kind: ContentKind) -> usize {
        self.log(kind).records.len()
    }

    /// Check if the ledger holds no records
    pub fn is_empty(&self) -> bool {
        self.text.records.is_empty() && self.images.records.is_empty()
    }

    /// Find the image record for an image element
    pub fn find_image(&self, image: NodeId) -> Option<&RedactionRecord> {
        self.images
            .records
            .iter()
            .find(|record| record.target.node() == image)
    }

    /// Find the image record whose overlay button is `button`
    pub fn find_by_view_button(&self, button: NodeId) -> Option<&RedactionRecord> {
        self.images.records.iter().find(|record| match &record.target {
            RedactionTarget::Image(redaction) => redaction.view_button == button,
            RedactionTarget::Text { .. } => false,
        })
    }

    /// Undo a redaction on the page and mark it recovered
    pub fn recover(
        &mut self,
        doc: &mut Document,
        engine: &RedactionEngine,
        kind: ContentKind,
        index: usize,
    ) -> Result<&RedactionRecord> {
        let log = self.log_mut(kind);
        let position = log.position(kind, index)?;
        let record = &mut log.records[position];

        if record.recovered {
            return Err(LedgerError::AlreadyRecovered { kind, index });
        }

        match &record.target {
            RedactionTarget::Text { node } => {
                if !engine.restore_text(doc, *node, &record.applied_value, &record.original_value)? {
                    return Err(LedgerError::Replaced { kind, index });
                }
            }
            RedactionTarget::Image(redaction) => engine.restore_image(doc, redaction)?,
        }
        record.recovered = true;

        Ok(record)
    }

    /// Drop every record. Indices issued so far become stale.
    pub fn reset(&mut self) {
        self.text.reset();
        self.images.reset();
    }
}
