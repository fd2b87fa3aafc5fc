//! Scan tuning and versioned configuration snapshots

use std::sync::Arc;
use std::time::Duration;
use storage::{FilterConfig, FilterConfigPatch};
use tokio::sync::watch;

/// Tuning knobs for scanning and classification
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    /// Text nodes per batch
    pub text_batch_size: usize,
    /// Images per batch
    pub image_batch_size: usize,
    /// Images narrower or shorter than this (px) are ignored
    pub icon_threshold: u32,
    /// Images must exceed this on both sides (px) to be sent to the backend
    pub remote_image_threshold: u32,
    /// Text must be longer than this (chars) to be sent to the backend
    pub min_remote_text_len: usize,
    /// Backend request timeout
    pub request_timeout: Duration,
    /// Retries for transient backend failures
    pub max_retries: usize,
    /// Blur radius for filtered images (px)
    pub blur_radius: u32,
    /// Also desaturate filtered images
    pub desaturate: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            text_batch_size: 50,
            image_batch_size: 10,
            icon_threshold: 50,
            remote_image_threshold: 100,
            min_remote_text_len: 10,
            request_timeout: Duration::from_secs(10),
            max_retries: 0,
            blur_radius: 25,
            desaturate: false,
        }
    }
}

impl ScanSettings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set both batch sizes (a zero size is treated as one)
    pub fn with_batch_sizes(mut self, text: usize, images: usize) -> Self {
        self.text_batch_size = text.max(1);
        self.image_batch_size = images.max(1);
        self
    }

    /// Set the backend request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry count for transient failures
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the blur radius
    pub fn with_blur_radius(mut self, radius: u32) -> Self {
        self.blur_radius = radius;
        self
    }

    /// Enable desaturation of filtered images
    pub fn with_desaturate(mut self, desaturate: bool) -> Self {
        self.desaturate = desaturate;
        self
    }

    /// Check if an image is too small to consider at all
    pub fn is_icon(&self, width: u32, height: u32) -> bool {
        width < self.icon_threshold || height < self.icon_threshold
    }

    /// Check if an image is large enough for the backend
    pub fn is_remote_image(&self, width: u32, height: u32) -> bool {
        width > self.remote_image_threshold && height > self.remote_image_threshold
    }

    /// Check if text is long enough for the backend
    pub fn is_remote_text(&self, text: &str) -> bool {
        text.chars().count() > self.min_remote_text_len
    }
}

/// A configuration value together with its version
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Incremented on every update
    pub version: u64,
    /// The configuration
    pub config: Arc<FilterConfig>,
}

/// Shared, versioned configuration
///
/// Scans take a snapshot when they start and keep it until they finish, so
/// an update never changes the rules of a pass that is already running.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<ConfigSnapshot>>,
}

impl ConfigHandle {
    /// Create a handle at version 0
    pub fn new(config: FilterConfig) -> Self {
        let (tx, _rx) = watch::channel(ConfigSnapshot {
            version: 0,
            config: Arc::new(config),
        });
        Self { tx: Arc::new(tx) }
    }

    /// Current snapshot
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.tx.borrow().clone()
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.tx.borrow().version
    }

    /// Replace the configuration and return the new version
    pub fn replace(&self, config: FilterConfig) -> u64 {
        let mut version = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.config = Arc::new(config);
            version = snapshot.version;
        });
        tracing::debug!("Configuration replaced (version {})", version);
        version
    }

    /// Merge a partial update and return the new snapshot
    pub fn apply(&self, patch: &FilterConfigPatch) -> ConfigSnapshot {
        self.tx.send_modify(|snapshot| {
            let mut config = (*snapshot.config).clone();
            config.apply(patch);
            snapshot.version += 1;
            snapshot.config = Arc::new(config);
        });
        let snapshot = self.snapshot();
        tracing::debug!("Configuration updated (version {})", snapshot.version);
        snapshot
    }

    /// Receive every future update
    pub fn subscribe(&self) -> watch::Receiver<ConfigSnapshot> {
        self.tx.subscribe()
    }
}
