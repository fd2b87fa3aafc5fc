//! Background store
//!
//! Holds the configuration, statistics and history shared by every page.
//! Content scripts report into it through [`StoreMessage`]s; the popup
//! reads it back directly.

use crate::config::{FilterConfig, FilterConfigPatch};
use crate::history::{ContentKind, DomainHistory, ExtensionState, FilterStats, HistoryEntry};
use crate::persistence::{PersistedState, PersistenceConfig, PersistenceError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Background store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying persistence failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// No history entry at the given position
    #[error("No {kind} history entry {index} for {domain}")]
    EntryNotFound {
        /// Domain the lookup was for
        domain: String,
        /// Content kind
        kind: ContentKind,
        /// Requested position
        index: usize,
    },
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Messages content scripts send to the background store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StoreMessage {
    /// Count one filtering event
    UpdateStats {
        /// `text` or `image`
        #[serde(rename = "type")]
        kind: ContentKind,
    },
    /// Record one filtering event in the page's domain history
    AddToHistory {
        /// Page hostname
        domain: String,
        /// `text` or `image`
        #[serde(rename = "type")]
        kind: ContentKind,
        /// Original content
        content: String,
        /// What replaced it
        replacement: String,
    },
}

/// Persistent shared state for the extension
#[derive(Clone)]
pub struct BackgroundStore {
    state: Arc<PersistedState<ExtensionState>>,
}

impl BackgroundStore {
    /// Open the store, loading any existing state from disk
    pub async fn open(config: PersistenceConfig) -> Result<Self> {
        let state = PersistedState::new(config);
        let outcome = state.init().await?;
        tracing::debug!("Background store opened at {} ({:?})", state.path().display(), outcome);

        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// Spawn a task draining messages into this store and return its sender
    pub fn spawn(&self) -> mpsc::UnboundedSender<StoreMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        tokio::spawn(async move { store.run(rx).await });
        tx
    }

    /// Apply messages until every sender is dropped
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<StoreMessage>) {
        while let Some(message) = rx.recv().await {
            if let Err(e) = self.apply(message).await {
                tracing::error!("Failed to apply store message: {}", e);
            }
        }
        tracing::debug!("Background store channel closed");
    }

    /// Apply a single message
    pub async fn apply(&self, message: StoreMessage) -> Result<()> {
        match message {
            StoreMessage::UpdateStats { kind } => self.update_stats(kind).await.map(|_| ()),
            StoreMessage::AddToHistory {
                domain,
                kind,
                content,
                replacement,
            } => self
                .add_to_history(&domain, kind, content, replacement)
                .await
                .map(|_| ()),
        }
    }

    /// Increment the counter for `kind` and return the new totals
    pub async fn update_stats(&self, kind: ContentKind) -> Result<FilterStats> {
        let stats = self
            .state
            .update(|state| {
                state.stats.increment(kind);
                state.stats
            })
            .await?;
        Ok(stats)
    }

    /// Append a history entry and return its position within its kind
    pub async fn add_to_history(
        &self,
        domain: &str,
        kind: ContentKind,
        content: String,
        replacement: String,
    ) -> Result<usize> {
        let entry = HistoryEntry {
            timestamp: Utc::now(),
            content,
            replacement,
            recovered: false,
        };

        let index = self
            .state
            .update(|state| {
                let entries = state
                    .history
                    .entry(domain.to_string())
                    .or_default()
                    .entries_mut(kind);
                entries.push(entry);
                entries.len() - 1
            })
            .await?;

        tracing::debug!("Recorded {} history entry {} for {}", kind, index, domain);
        Ok(index)
    }

    /// History for one domain; empty when nothing was recorded
    pub async fn get_history(&self, domain: &str) -> Result<DomainHistory> {
        let state = self.state.get().await?;
        Ok(state.history.get(domain).cloned().unwrap_or_default())
    }

    /// Mark a history entry as recovered
    pub async fn mark_recovered(&self, domain: &str, kind: ContentKind, index: usize) -> Result<()> {
        let found = self
            .state
            .update(|state| {
                match state
                    .history
                    .get_mut(domain)
                    .and_then(|history| history.entries_mut(kind).get_mut(index))
                {
                    Some(entry) => {
                        entry.recovered = true;
                        true
                    }
                    None => false,
                }
            })
            .await?;

        if found {
            Ok(())
        } else {
            Err(StoreError::EntryNotFound {
                domain: domain.to_string(),
                kind,
                index,
            })
        }
    }

    /// Current statistics
    pub async fn stats(&self) -> Result<FilterStats> {
        Ok(self.state.get().await?.stats)
    }

    /// Current configuration
    pub async fn config(&self) -> Result<FilterConfig> {
        Ok(self.state.get().await?.config)
    }

    /// Merge a partial configuration update and return the result
    pub async fn update_config(&self, patch: &FilterConfigPatch) -> Result<FilterConfig> {
        let config = self
            .state
            .update(|state| {
                state.config.apply(patch);
                state.config.clone()
            })
            .await?;
        tracing::info!("Filter configuration updated");
        Ok(config)
    }

    /// Reset statistics and history, keeping the configuration
    pub async fn clear_history(&self) -> Result<()> {
        self.state
            .update(|state| {
                state.stats = FilterStats::default();
                state.history.clear();
            })
            .await?;
        Ok(())
    }
}
