//! Content filtering for the Socio.io content filter
//!
//! This crate is the page-side half of the extension: it scans a document
//! for text and images, filters them locally or through the moderation
//! backend, redacts what should not be shown and keeps a ledger so every
//! redaction can be undone.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classification;
pub mod classifier;
pub mod config;
pub mod ledger;
pub mod lexicon;
pub mod loader;
pub mod message;
pub mod observer;
pub mod pipeline;
pub mod redaction;
pub mod scanner;
pub mod telemetry;

pub use classification::{ClassificationMethod, ClassificationResult, ImageScores, TextVerdict};
pub use classifier::{validate_api_url, Classifier, FallbackClassifier, HealthStatus, ImagePayload, RemoteClassifier};
pub use config::{ConfigHandle, ConfigSnapshot, ScanSettings};
pub use ledger::{LedgerError, RecoveryLedger, RedactionRecord, RedactionTarget};
pub use lexicon::{Lexicon, LexiconError};
pub use loader::{HttpImageLoader, ImageLoader};
pub use message::{ExtensionMessage, MessageResponse};
pub use observer::{ChangeObserver, ScanTrigger};
pub use pipeline::{share, ContentFilter, ContentFilterBuilder, SharedDocument};
pub use redaction::{ImageRedaction, RedactionEngine};
pub use scanner::{ImageCandidate, ImageScan, TextCandidate, TextScan};
pub use telemetry::TelemetryRelay;

use document::{DocumentError, NodeId};
use networking::NetworkError;
use thiserror::Error;

/// Errors surfaced by the content filter
#[derive(Debug, Error)]
pub enum FilterError {
    /// Document manipulation failed
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    /// Recovery request could not be honoured
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Term list could not be loaded
    #[error("Lexicon error: {0}")]
    Lexicon(#[from] LexiconError),

    /// Backend could not be reached
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Backend answered its health check with something other than `ok`
    #[error("Backend unhealthy: {0}")]
    Unhealthy(String),

    /// Node does not carry a redaction
    #[error("No redaction applied to {0:?}")]
    NotRedacted(NodeId),
}

/// Result type for content filter operations
pub type Result<T> = std::result::Result<T, FilterError>;
