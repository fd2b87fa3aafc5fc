//! Background storage for the Socio.io content filter
//!
//! This crate owns the extension's shared persistent state: the filter
//! configuration, filtering statistics and the per-domain history the
//! content script reports into.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod background;
pub mod config;
pub mod history;
pub mod persistence;

pub use background::{BackgroundStore, StoreError, StoreMessage};
pub use config::{FilterConfig, FilterConfigPatch, ImageFilterMethod};
pub use history::{ContentKind, DomainHistory, ExtensionState, FilterStats, HistoryEntry};
pub use persistence::{LoadOutcome, PersistedState, PersistenceConfig, PersistenceError};
