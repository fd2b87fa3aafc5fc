//! Messages the popup and background send to the page filter

use serde::{Deserialize, Serialize};
use storage::{ContentKind, FilterConfigPatch};

/// A request to the page filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    /// Run a full filtering pass
    RefreshFilters,
    /// Merge a configuration change and run a full pass
    UpdateConfig {
        /// Fields to change
        config: FilterConfigPatch,
    },
    /// Undo one redaction
    RecoverContent {
        /// `text` or `image`
        #[serde(rename = "type")]
        kind: ContentKind,
        /// Ledger index
        index: usize,
    },
}

/// Reply to an [`ExtensionMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Whether the request was carried out
    pub success: bool,
    /// Why it was not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    /// A successful reply
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    /// A failed reply
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}
