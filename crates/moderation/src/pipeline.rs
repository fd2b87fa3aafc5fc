//! Content filter pipeline
//!
//! [`ContentFilter`] drives one page: it scans the document, runs the local
//! lexical filter, hands substantial leftovers to the classifier, applies
//! redactions, records them in the ledger and reports them to the background
//! store.
//!
//! The document and ledger sit behind synchronous locks that are never held
//! across an await. When both are needed the document is locked first.
//! Remote classifications run as spawned tasks; their results are checked
//! against the live document before they are applied, so a node that was
//! removed or changed in the meantime is left alone.
//!
//! Full passes are serialized. A configuration update reaches the filter
//! both through its message and through the config watcher, but only the
//! first of the two runs a pass for that version.

use crate::classification::{ClassificationMethod, ClassificationResult, TextVerdict};
use crate::classifier::{Classifier, FallbackClassifier, ImagePayload, RemoteClassifier};
use crate::config::{ConfigHandle, ConfigSnapshot, ScanSettings};
use crate::ledger::{RecoveryLedger, RedactionRecord, RedactionTarget};
use crate::lexicon::Lexicon;
use crate::loader::{HttpImageLoader, ImageLoader};
use crate::message::{ExtensionMessage, MessageResponse};
use crate::observer::{ChangeObserver, ScanTrigger};
use crate::redaction::{ImageRedaction, RedactionEngine};
use crate::scanner::{ImageCandidate, ImageScan, TextCandidate, TextScan};
use crate::telemetry::{TelemetryRelay, BLURRED_IMAGE};
use crate::{FilterError, Result};
use document::{Document, NodeId};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use storage::{ContentKind, FilterConfig, ImageFilterMethod, StoreMessage};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A document shared between the host and the filter
pub type SharedDocument = Arc<Mutex<Document>>;

/// Wrap a document for sharing with a [`ContentFilter`]
pub fn share(document: Document) -> SharedDocument {
    Arc::new(Mutex::new(document))
}

/// Builder for [`ContentFilter`]
pub struct ContentFilterBuilder {
    document: SharedDocument,
    config: ConfigHandle,
    settings: ScanSettings,
    lexicon: Lexicon,
    fallback: FallbackClassifier,
    classifier: Option<Arc<dyn Classifier>>,
    loader: Option<Arc<dyn ImageLoader>>,
    telemetry: Option<mpsc::UnboundedSender<StoreMessage>>,
}

impl ContentFilterBuilder {
    /// Set scan settings
    pub fn with_settings(mut self, settings: ScanSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the local term list
    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Set the term list used when the backend is unavailable
    pub fn with_fallback_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.fallback = FallbackClassifier::new(lexicon);
        self
    }

    /// Use this classifier instead of the HTTP backend client whenever a
    /// backend URL is configured
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Use this image loader instead of fetching over HTTP
    pub fn with_image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Report filtering events into a background store channel
    pub fn with_telemetry(mut self, tx: mpsc::UnboundedSender<StoreMessage>) -> Self {
        self.telemetry = Some(tx);
        self
    }

    /// Build the filter
    pub fn build(self) -> ContentFilter {
        let page_url = self.document.lock().url().to_string();

        let loader = self.loader.or_else(|| {
            match HttpImageLoader::new(&page_url, self.settings.request_timeout) {
                Ok(loader) => Some(Arc::new(loader) as Arc<dyn ImageLoader>),
                Err(e) => {
                    tracing::warn!("Image loading unavailable for {}: {}", page_url, e);
                    None
                }
            }
        });

        let telemetry = match self.telemetry {
            Some(tx) => TelemetryRelay::new(tx, &page_url),
            None => TelemetryRelay::disabled(&page_url),
        };

        let (in_flight, _) = watch::channel(0usize);

        ContentFilter {
            inner: Arc::new(Inner {
                document: self.document,
                config: self.config,
                engine: RedactionEngine::from_settings(&self.settings),
                settings: self.settings,
                lexicon: self.lexicon,
                fallback: self.fallback,
                ledger: Mutex::new(RecoveryLedger::new()),
                telemetry,
                classifier: self.classifier,
                remote: Mutex::new(None),
                loader,
                observer: Mutex::new(None),
                in_flight: Arc::new(in_flight),
                last_pass: tokio::sync::Mutex::new(None),
            }),
        }
    }
}

struct Inner {
    document: SharedDocument,
    config: ConfigHandle,
    settings: ScanSettings,
    lexicon: Lexicon,
    fallback: FallbackClassifier,
    engine: RedactionEngine,
    ledger: Mutex<RecoveryLedger>,
    telemetry: TelemetryRelay,
    classifier: Option<Arc<dyn Classifier>>,
    remote: Mutex<Option<(String, Arc<dyn Classifier>)>>,
    loader: Option<Arc<dyn ImageLoader>>,
    observer: Mutex<Option<ChangeObserver>>,
    in_flight: Arc<watch::Sender<usize>>,
    /// Config version of the latest full pass; held for the whole pass
    last_pass: tokio::sync::Mutex<Option<u64>>,
}

/// Counts a spawned classification until it finishes
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(counter: Arc<watch::Sender<usize>>) -> Self {
        counter.send_modify(|pending| *pending += 1);
        Self(counter)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|pending| *pending = pending.saturating_sub(1));
    }
}

/// The page filter
#[derive(Clone)]
pub struct ContentFilter {
    inner: Arc<Inner>,
}

impl ContentFilter {
    /// Start building a filter for a document
    pub fn builder(document: SharedDocument, config: FilterConfig) -> ContentFilterBuilder {
        ContentFilterBuilder {
            document,
            config: ConfigHandle::new(config),
            settings: ScanSettings::default(),
            lexicon: Lexicon::canonical(),
            fallback: FallbackClassifier::default(),
            classifier: None,
            loader: None,
            telemetry: None,
        }
    }

    /// The filtered document
    pub fn document(&self) -> &SharedDocument {
        &self.inner.document
    }

    /// Configuration handle
    pub fn config(&self) -> &ConfigHandle {
        &self.inner.config
    }

    /// Scan settings
    pub fn settings(&self) -> &ScanSettings {
        &self.inner.settings
    }

    /// Domain filtering events are reported under
    pub fn domain(&self) -> &str {
        self.inner.telemetry.domain()
    }

    // =========================================================================
    // Passes
    // =========================================================================

    /// Start filtering if the configuration has been set up and is enabled.
    /// Returns whether a pass ran.
    pub async fn init(&self) -> bool {
        let snapshot = self.inner.config.snapshot();
        if !snapshot.config.should_start() {
            tracing::info!("Content filter not started on {}: not configured or disabled", self.domain());
            return false;
        }
        self.start_filtering().await;
        true
    }

    /// Run a full filtering pass: reset the ledger, start observing changes,
    /// scan text and images. A disabled configuration makes this a no-op.
    /// A pass that is already running finishes first.
    pub async fn start_filtering(&self) {
        self.run_pass(None).await;
    }

    /// Run a full pass unless one already covered config version `covers`
    async fn run_pass(&self, covers: Option<u64>) {
        let mut last_pass = self.inner.last_pass.lock().await;
        if let (Some(wanted), Some(done)) = (covers, *last_pass) {
            if done >= wanted {
                tracing::debug!("Config version {} already filtered on {}", wanted, self.domain());
                return;
            }
        }

        let snapshot = self.inner.config.snapshot();
        if !snapshot.config.enabled {
            tracing::debug!("Filtering disabled, skipping pass on {}", self.domain());
            return;
        }
        *last_pass = Some(snapshot.version);

        self.inner.ledger.lock().reset();
        self.ensure_observer();
        tracing::info!(
            "Filtering {} (config version {})",
            self.domain(),
            snapshot.version
        );

        if snapshot.config.filter_text {
            self.scan_text(&snapshot).await;
        }
        if snapshot.config.filter_images {
            self.scan_images(&snapshot).await;
        }
    }

    /// Scan text only, without resetting the ledger
    pub async fn filter_text_content(&self) {
        let snapshot = self.inner.config.snapshot();
        if snapshot.config.enabled && snapshot.config.filter_text {
            self.scan_text(&snapshot).await;
        }
    }

    /// Scan images only, without resetting the ledger
    pub async fn filter_image_content(&self) {
        let snapshot = self.inner.config.snapshot();
        if snapshot.config.enabled && snapshot.config.filter_images {
            self.scan_images(&snapshot).await;
        }
    }

    /// Deliver pending change records: run at most one text scan and one
    /// image scan for everything inserted since the last call
    pub async fn process_mutations(&self) -> ScanTrigger {
        let Some(observer) = *self.inner.observer.lock() else {
            return ScanTrigger::default();
        };
        let trigger = observer.poll(&mut self.inner.document.lock());

        let snapshot = self.inner.config.snapshot();
        if !snapshot.config.enabled {
            return ScanTrigger::default();
        }
        let trigger = trigger.masked(snapshot.config.filter_text, snapshot.config.filter_images);

        if trigger.text {
            self.scan_text(&snapshot).await;
        }
        if trigger.images {
            self.scan_images(&snapshot).await;
        }
        trigger
    }

    /// Run a full pass whenever the configuration handle is updated
    pub fn spawn_config_watcher(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut updates = self.inner.config.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let version = updates.borrow_and_update().version;
                tracing::debug!("Configuration version {} received", version);
                this.run_pass(Some(version)).await;
            }
        })
    }

    /// Stop observing the document
    pub fn shutdown(&self) {
        let observer = self.inner.observer.lock().take();
        if let Some(observer) = observer {
            observer.detach(&mut self.inner.document.lock());
        }
    }

    /// Wait for every in-flight classification to finish
    pub async fn settle(&self) {
        let mut pending = self.inner.in_flight.subscribe();
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    /// Number of in-flight classifications
    pub fn pending(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    fn ensure_observer(&self) {
        let mut doc = self.inner.document.lock();
        let mut observer = self.inner.observer.lock();
        if observer.is_none() {
            let body = doc.body();
            *observer = Some(ChangeObserver::attach(&mut doc, body));
        }
    }

    fn spawn_tracked<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = InFlight::enter(self.inner.in_flight.clone());
        tokio::spawn(async move {
            let _guard = guard;
            task.await;
        });
    }

    fn remote_classifier(&self, snapshot: &ConfigSnapshot) -> Option<Arc<dyn Classifier>> {
        let api_url = snapshot.config.api_url.as_deref()?.trim();
        if api_url.is_empty() {
            return None;
        }
        if let Some(classifier) = &self.inner.classifier {
            return Some(classifier.clone());
        }

        let mut cached = self.inner.remote.lock();
        if let Some((url, classifier)) = cached.as_ref() {
            if url == api_url {
                return Some(classifier.clone());
            }
        }

        match RemoteClassifier::new(api_url, &self.inner.settings, self.inner.fallback.clone()) {
            Ok(classifier) => {
                let classifier: Arc<dyn Classifier> = Arc::new(classifier);
                *cached = Some((api_url.to_string(), classifier.clone()));
                Some(classifier)
            }
            Err(e) => {
                tracing::warn!("Backend URL {} unusable, filtering locally: {}", api_url, e);
                None
            }
        }
    }

    // =========================================================================
    // Text
    // =========================================================================

    async fn scan_text(&self, snapshot: &ConfigSnapshot) {
        let body = self.inner.document.lock().body();
        let mut scan = TextScan::new(body, self.inner.settings.text_batch_size);

        loop {
            let batch = scan.next_batch(&mut self.inner.document.lock());
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Text batch of {} on {}", batch.len(), self.domain());
            for candidate in batch {
                self.process_text(candidate, snapshot);
            }
            tokio::task::yield_now().await;
        }
    }

    fn process_text(&self, candidate: TextCandidate, snapshot: &ConfigSnapshot) {
        let local = self.inner.lexicon.filter(&candidate.text);
        if local.is_match() {
            let replacement = local.text.into_owned();
            let result = ClassificationResult::explicit(1.0, Vec::new(), ClassificationMethod::Local);
            self.apply_text(&candidate, &replacement, &result);
            return;
        }

        if !self.inner.settings.is_remote_text(&candidate.text) {
            return;
        }

        match self.remote_classifier(snapshot) {
            Some(classifier) => {
                let this = self.clone();
                self.spawn_tracked(async move {
                    let verdict = classifier.classify_text(&candidate.text).await;
                    this.apply_verdict(&candidate, verdict);
                });
            }
            None => {
                let verdict = self.inner.fallback.classify_text_now(&candidate.text);
                self.apply_verdict(&candidate, verdict);
            }
        }
    }

    fn apply_verdict(&self, candidate: &TextCandidate, verdict: TextVerdict) {
        if !verdict.should_rewrite() {
            return;
        }
        if let Some(replacement) = &verdict.replacement {
            self.apply_text(candidate, replacement, &verdict.result);
        }
    }

    fn apply_text(&self, candidate: &TextCandidate, replacement: &str, result: &ClassificationResult) -> Option<usize> {
        let node = candidate.node;
        let index = {
            let mut doc = self.inner.document.lock();
            if !doc.is_connected(node) || doc.text(node) != Some(candidate.text.as_str()) {
                tracing::debug!("Discarding text verdict for changed node {:?}", node);
                return None;
            }

            match self.inner.engine.redact_text(&mut doc, node, replacement) {
                Ok(Some(original)) => {
                    self.inner
                        .ledger
                        .lock()
                        .record(original, replacement, RedactionTarget::Text { node })
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("Failed to redact text node {:?}: {}", node, e);
                    return None;
                }
            }
        };

        self.inner.telemetry.report(ContentKind::Text, &candidate.text, replacement);
        tracing::info!(
            "Filtered text on {} via {} (index {})",
            self.domain(),
            result.method,
            index
        );
        Some(index)
    }

    // =========================================================================
    // Images
    // =========================================================================

    async fn scan_images(&self, snapshot: &ConfigSnapshot) {
        let body = self.inner.document.lock().body();
        let mut scan = ImageScan::new(body, &self.inner.settings);

        loop {
            let batch = scan.next_batch(&mut self.inner.document.lock());
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Image batch of {} on {}", batch.len(), self.domain());
            for candidate in batch {
                self.process_image(candidate, snapshot);
            }
            tokio::task::yield_now().await;
        }
    }

    fn process_image(&self, candidate: ImageCandidate, snapshot: &ConfigSnapshot) {
        if self.inner.settings.is_remote_image(candidate.width, candidate.height) {
            if let Some(classifier) = self.remote_classifier(snapshot) {
                let this = self.clone();
                let method = snapshot.config.image_filter_method;
                self.spawn_tracked(async move {
                    this.classify_remote_image(classifier, candidate, method).await;
                });
                return;
            }
        }

        let result = self.inner.fallback.classify_dimensions(candidate.width, candidate.height);
        if result.should_filter() {
            self.apply_image(&candidate, &result);
        }
    }

    async fn classify_remote_image(
        &self,
        classifier: Arc<dyn Classifier>,
        candidate: ImageCandidate,
        method: ImageFilterMethod,
    ) {
        let indicator = self.show_loading(candidate.element);

        let bytes = match &self.inner.loader {
            Some(loader) => match loader.load(&candidate.src).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!("Failed to load image {}: {}", candidate.src, e);
                    None
                }
            },
            None => None,
        };

        let result = match bytes {
            Some(bytes) => {
                let payload = ImagePayload::new(bytes, candidate.width, candidate.height);
                classifier.classify_image(&payload, method).await
            }
            None => self.inner.fallback.classify_dimensions(candidate.width, candidate.height),
        };

        self.hide_loading(indicator);
        if result.should_filter() {
            self.apply_image(&candidate, &result);
        }
    }

    fn show_loading(&self, image: NodeId) -> Option<NodeId> {
        let mut doc = self.inner.document.lock();
        match self.inner.engine.show_loading(&mut doc, image) {
            Ok(indicator) => Some(indicator),
            Err(e) => {
                tracing::debug!("No loading indicator for {:?}: {}", image, e);
                None
            }
        }
    }

    fn hide_loading(&self, indicator: Option<NodeId>) {
        if let Some(indicator) = indicator {
            self.inner.engine.hide_loading(&mut self.inner.document.lock(), indicator);
        }
    }

    fn apply_image(&self, candidate: &ImageCandidate, result: &ClassificationResult) -> Option<usize> {
        let image = candidate.element;
        let index = {
            let mut doc = self.inner.document.lock();
            let src_unchanged = doc.attribute(image, "src").map(str::trim) == Some(candidate.src.as_str());
            if !doc.is_connected(image) || !src_unchanged {
                tracing::debug!("Discarding image verdict for changed element {:?}", image);
                return None;
            }

            match self.inner.engine.redact_image(&mut doc, image, result) {
                Ok(Some(redaction)) => self.inner.ledger.lock().record(
                    candidate.src.clone(),
                    BLURRED_IMAGE,
                    RedactionTarget::Image(redaction),
                ),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("Failed to redact image {}: {}", candidate.src, e);
                    return None;
                }
            }
        };

        self.inner.telemetry.report(ContentKind::Image, &candidate.src, BLURRED_IMAGE);
        tracing::info!(
            "Filtered image {} on {} via {} ({}% confidence, index {})",
            candidate.src,
            self.domain(),
            result.method,
            result.confidence_percent(),
            index
        );
        Some(index)
    }

    // =========================================================================
    // Recovery and user actions
    // =========================================================================

    /// Undo one redaction
    pub fn recover(&self, kind: ContentKind, index: usize) -> Result<RedactionRecord> {
        let mut doc = self.inner.document.lock();
        let mut ledger = self.inner.ledger.lock();
        let record = ledger.recover(&mut doc, &self.inner.engine, kind, index)?.clone();

        tracing::info!("Recovered {} redaction {} on {}", kind, index, self.domain());
        Ok(record)
    }

    /// The "View Image" action for a filtered image. Returns `false` if it
    /// was already revealed.
    pub fn reveal_image(&self, image: NodeId) -> Result<bool> {
        self.reveal_with(image, |ledger| ledger.find_image(image))
    }

    /// The "View Image" action, addressed by the overlay button
    pub fn press_view_button(&self, button: NodeId) -> Result<bool> {
        self.reveal_with(button, |ledger| ledger.find_by_view_button(button))
    }

    fn reveal_with<F>(&self, node: NodeId, find: F) -> Result<bool>
    where
        F: for<'a> FnOnce(&'a RecoveryLedger) -> Option<&'a RedactionRecord>,
    {
        let mut doc = self.inner.document.lock();
        let redaction: ImageRedaction = {
            let ledger = self.inner.ledger.lock();
            find(&*ledger)
                .filter(|record| !record.recovered)
                .and_then(|record| match &record.target {
                    RedactionTarget::Image(redaction) => Some(redaction.clone()),
                    RedactionTarget::Text { .. } => None,
                })
                .ok_or(FilterError::NotRedacted(node))?
        };

        let revealed = self.inner.engine.reveal_image(&mut doc, &redaction)?;
        if revealed {
            tracing::info!("Image {:?} revealed on {}", redaction.image, self.domain());
        }
        Ok(revealed)
    }

    /// Snapshot of the ledger for one kind
    pub fn ledger_records(&self, kind: ContentKind) -> Vec<RedactionRecord> {
        self.inner.ledger.lock().records(kind).to_vec()
    }

    // =========================================================================
    // Messages
    // =========================================================================

    /// Handle a message from the popup or background
    pub async fn handle_message(&self, message: ExtensionMessage) -> MessageResponse {
        match message {
            ExtensionMessage::RefreshFilters => {
                self.start_filtering().await;
                MessageResponse::ok()
            }
            ExtensionMessage::UpdateConfig { config } => {
                let snapshot = self.inner.config.apply(&config);
                self.run_pass(Some(snapshot.version)).await;
                MessageResponse::ok()
            }
            ExtensionMessage::RecoverContent { kind, index } => match self.recover(kind, index) {
                Ok(_) => MessageResponse::ok(),
                Err(e) => {
                    tracing::warn!("Recovery request failed on {}: {}", self.domain(), e);
                    MessageResponse::failed(e.to_string())
                }
            },
        }
    }
}
