//! Socio.io content filter
//!
//! Facade over the workspace crates. Hosts embed [`ContentFilter`] in the
//! page, run a [`BackgroundStore`] for shared state and wire the two
//! together with the store's telemetry channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub use document;
pub use moderation;
pub use networking;
pub use storage;

pub use moderation::{
    share, ContentFilter, ContentFilterBuilder, ExtensionMessage, FilterError, MessageResponse, ScanSettings,
    SharedDocument,
};
pub use storage::{BackgroundStore, FilterConfig, PersistenceConfig};

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,moderation=debug";

/// Install a global `tracing` subscriber honouring `RUST_LOG`
///
/// Returns `false` if a subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_once() {
        init_tracing();
        assert!(!init_tracing());
    }
}
