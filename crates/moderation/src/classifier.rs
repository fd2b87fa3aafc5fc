//! Classifier client
//!
//! [`RemoteClassifier`] talks to the moderation backend. Every call resolves
//! to a result: network failures, error statuses, malformed payloads and
//! timeouts all degrade to [`FallbackClassifier`], so callers never see an
//! error from classification.

use crate::classification::{
    clamp_unit, text_is_explicit, ClassificationMethod, ClassificationResult, ImageScores, TextVerdict,
    FALLBACK_CONFIDENCE,
};
use crate::config::ScanSettings;
use crate::lexicon::{mask_all, Lexicon};
use crate::{FilterError, Result};
use async_trait::async_trait;
use networking::{retry, HttpClient, HttpClientConfig, NetworkError, RetryConfig};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use storage::ImageFilterMethod;
use url::Url;

/// Image handed to a classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Encoded image bytes
    pub bytes: Vec<u8>,
    /// Rendered width in pixels
    pub width: u32,
    /// Rendered height in pixels
    pub height: u32,
}

impl ImagePayload {
    /// Create a payload
    pub fn new(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self { bytes, width, height }
    }
}

/// Something that can classify text and images
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a text span
    async fn classify_text(&self, text: &str) -> TextVerdict;

    /// Classify an image
    async fn classify_image(&self, image: &ImagePayload, method: ImageFilterMethod) -> ClassificationResult;
}

// =============================================================================
// Fallback
// =============================================================================

/// Check the banner heuristic: an extreme aspect ratio and one side over 300px
pub fn is_banner(width: u32, height: u32) -> bool {
    if width == 0 && height == 0 {
        return false;
    }
    let aspect = width as f64 / height as f64;
    (aspect > 3.0 || aspect < 0.3) && (width > 300 || height > 300)
}

/// Offline classifier built on a wordlist and the banner heuristic
#[derive(Debug, Clone)]
pub struct FallbackClassifier {
    lexicon: Lexicon,
}

impl Default for FallbackClassifier {
    fn default() -> Self {
        Self::new(Lexicon::extended())
    }
}

impl FallbackClassifier {
    /// Create a fallback classifier over a term list
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// Term list in use
    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Classify text against the term list
    pub fn classify_text_now(&self, text: &str) -> TextVerdict {
        let matched = self.lexicon.filter(text);
        if !matched.is_match() {
            return TextVerdict::clean(ClassificationMethod::Fallback);
        }

        TextVerdict {
            result: ClassificationResult::explicit(FALLBACK_CONFIDENCE, Vec::new(), ClassificationMethod::Fallback),
            replacement: Some(matched.text.into_owned()),
            matched_terms: matched.matched_terms,
        }
    }

    /// Classify an image from its rendered size alone
    pub fn classify_dimensions(&self, width: u32, height: u32) -> ClassificationResult {
        if is_banner(width, height) {
            ClassificationResult::explicit(FALLBACK_CONFIDENCE, Vec::new(), ClassificationMethod::Fallback)
        } else {
            ClassificationResult::safe(ClassificationMethod::Fallback)
        }
    }
}

#[async_trait]
impl Classifier for FallbackClassifier {
    async fn classify_text(&self, text: &str) -> TextVerdict {
        self.classify_text_now(text)
    }

    async fn classify_image(&self, image: &ImagePayload, _method: ImageFilterMethod) -> ClassificationResult {
        self.classify_dimensions(image.width, image.height)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

/// AI analysis block of a text response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiAnalysis {
    /// Provider verdict
    pub is_explicit: bool,
    /// Provider confidence
    pub confidence: f64,
    /// Provider categories
    pub categories: Vec<String>,
    /// Flagged terms
    pub detected_terms: Vec<String>,
}

/// Response of `POST /filter/text`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextResponse {
    /// Text as received
    pub original: Option<String>,
    /// Backend rewrite
    pub filtered: Option<String>,
    /// Backend wordlist verdict
    pub has_explicit_content: bool,
    /// Provider analysis
    pub ai: Option<AiAnalysis>,
}

impl TextResponse {
    /// Interpret the response for `original`
    pub fn into_verdict(self, original: &str) -> TextVerdict {
        let ai = self.ai.unwrap_or_default();
        let is_explicit = self.has_explicit_content
            || ai.is_explicit
            || text_is_explicit(ai.confidence, &ai.categories);
        let confidence = clamp_unit(ai.confidence);

        let result = ClassificationResult {
            is_explicit,
            confidence,
            categories: ai.categories,
            safe_score: 1.0 - confidence,
            method: ClassificationMethod::RemotePrimary,
        };

        let replacement = if is_explicit {
            Some(remote_replacement(original, self.filtered.as_deref(), &ai.detected_terms))
                .filter(|rewritten| rewritten != original)
        } else {
            None
        };

        TextVerdict {
            result,
            replacement,
            matched_terms: ai.detected_terms,
        }
    }
}

/// Rewrite for flagged text: the backend's rewrite if it changed anything,
/// else the detected terms masked, else every visible character masked
fn remote_replacement(original: &str, filtered: Option<&str>, detected_terms: &[String]) -> String {
    if let Some(filtered) = filtered {
        if filtered != original {
            return filtered.to_string();
        }
    }

    if let Ok(lexicon) = Lexicon::from_terms(detected_terms) {
        let masked = lexicon.filter(original);
        if masked.is_match() {
            return masked.text.into_owned();
        }
    }

    mask_all(original)
}

/// Response of `POST /filter/image`
///
/// Backends report either the aggregate fields, raw scores at the top level,
/// raw scores under `scores`, or a mix.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    /// Backend verdict
    #[serde(default)]
    pub should_filter: bool,
    /// Backend confidence
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Backend categories
    #[serde(default)]
    pub categories: Vec<String>,
    /// Backend safety score
    #[serde(default)]
    pub safe_score: Option<f64>,
    /// Provider that answered (`vertex` or `deepai`)
    #[serde(default)]
    pub method: Option<String>,
    /// Nested raw scores
    #[serde(default)]
    pub scores: Option<ImageScores>,
    /// Top-level raw scores
    #[serde(flatten)]
    pub raw: ImageScores,
}

impl ImageResponse {
    /// Interpret the response
    pub fn into_result(self, requested: ImageFilterMethod) -> ClassificationResult {
        let scores = self.raw.or(self.scores.unwrap_or_default());
        let is_explicit = self.should_filter || scores.should_filter();
        let confidence = clamp_unit(self.confidence.unwrap_or_else(|| scores.max_score()));

        let mut categories = self.categories;
        for category in scores.categories() {
            if !categories.iter().any(|c| c.eq_ignore_ascii_case(&category)) {
                categories.push(category);
            }
        }

        ClassificationResult {
            is_explicit,
            confidence,
            categories,
            safe_score: clamp_unit(self.safe_score.or(scores.safe).unwrap_or(1.0 - confidence)),
            method: remote_method(self.method.as_deref(), requested),
        }
    }
}

fn remote_method(reported: Option<&str>, requested: ImageFilterMethod) -> ClassificationMethod {
    match reported.map(str::to_ascii_lowercase).as_deref() {
        Some("vertex") => ClassificationMethod::RemotePrimary,
        Some("deepai") => ClassificationMethod::RemoteSecondary,
        _ => match requested {
            ImageFilterMethod::DeepAi => ClassificationMethod::RemoteSecondary,
            ImageFilterMethod::Auto | ImageFilterMethod::Vertex => ClassificationMethod::RemotePrimary,
        },
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `ok` when the backend is up
    pub status: String,
    /// Anything else the backend reports
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    /// Check if the backend reported itself healthy
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

// =============================================================================
// Remote
// =============================================================================

/// Parse and check a backend base URL
pub fn parse_api_url(api_url: &str) -> std::result::Result<Url, NetworkError> {
    let url = Url::parse(api_url.trim()).map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", api_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(NetworkError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            other, api_url
        ))),
    }
}

/// Backend classifier with local fallback
pub struct RemoteClassifier {
    client: HttpClient,
    retry: RetryConfig,
    fallback: FallbackClassifier,
}

impl RemoteClassifier {
    /// Create a client for a backend base URL
    pub fn new(api_url: &str, settings: &ScanSettings, fallback: FallbackClassifier) -> Result<Self> {
        let url = parse_api_url(api_url)?;
        let client = HttpClient::new(
            HttpClientConfig::new(url.as_str().trim_end_matches('/')).with_timeout(settings.request_timeout),
        )?;

        Ok(Self {
            client,
            retry: RetryConfig::new(settings.max_retries),
            fallback,
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Backend base URL
    pub fn api_url(&self) -> &str {
        self.client.base_url()
    }

    /// Query `GET /health`
    pub async fn health(&self) -> std::result::Result<HealthStatus, NetworkError> {
        self.client.get_json("/health").await
    }

    /// Call `POST /filter/text` without falling back
    pub async fn request_text(&self, text: &str) -> std::result::Result<TextResponse, NetworkError> {
        let body = TextRequest { text };
        retry(&self.retry, NetworkError::is_transient, || {
            self.client.post_json("/filter/text", &body)
        })
        .await
    }

    /// Call `POST /filter/image` without falling back
    pub async fn request_image(
        &self,
        image: &ImagePayload,
        method: ImageFilterMethod,
    ) -> std::result::Result<ImageResponse, NetworkError> {
        // Forms are consumed by the request, so every attempt builds its own
        let build_form = || -> std::result::Result<Form, NetworkError> {
            let part = Part::bytes(image.bytes.clone())
                .file_name("image.jpg")
                .mime_str("image/jpeg")?;
            Ok(Form::new().part("image", part).text("method", method.as_str()))
        };

        let build_form = &build_form;
        let client = &self.client;
        retry(&self.retry, NetworkError::is_transient, || async move {
            let form = build_form()?;
            client.post_multipart::<ImageResponse>("/filter/image", form).await
        })
        .await
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify_text(&self, text: &str) -> TextVerdict {
        match self.request_text(text).await {
            Ok(response) => response.into_verdict(text),
            Err(e) => {
                tracing::warn!("Text classification failed, using fallback: {}", e);
                self.fallback.classify_text_now(text)
            }
        }
    }

    async fn classify_image(&self, image: &ImagePayload, method: ImageFilterMethod) -> ClassificationResult {
        match self.request_image(image, method).await {
            Ok(response) => response.into_result(method),
            Err(e) => {
                tracing::warn!("Image classification failed, using fallback: {}", e);
                self.fallback.classify_dimensions(image.width, image.height)
            }
        }
    }
}

/// Check that a backend URL answers `GET /health` with `ok`
///
/// Used by the setup flow before a URL is saved.
pub async fn validate_api_url(api_url: &str, timeout: Duration) -> Result<HealthStatus> {
    let settings = ScanSettings::default().with_request_timeout(timeout);
    let classifier = RemoteClassifier::new(api_url, &settings, FallbackClassifier::default())?;
    let status = classifier.health().await?;

    if status.is_ok() {
        tracing::info!("Backend at {} is healthy", api_url);
        Ok(status)
    } else {
        Err(FilterError::Unhealthy(status.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_heuristic() {
        assert!(is_banner(728, 90));
        assert!(is_banner(90, 728));
        assert!(!is_banner(150, 150));
        assert!(!is_banner(280, 60));
        assert!(!is_banner(0, 0));
    }

    #[test]
    fn test_fallback_image_result() {
        let fallback = FallbackClassifier::default();

        let banner = fallback.classify_dimensions(970, 250);
        assert!(banner.should_filter());
        assert_eq!(banner.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(banner.method, ClassificationMethod::Fallback);

        let square = fallback.classify_dimensions(150, 150);
        assert!(!square.should_filter());
        assert_eq!(square.method, ClassificationMethod::Fallback);
    }

    #[test]
    fn test_fallback_text_uses_extended_terms() {
        let fallback = FallbackClassifier::default();
        let verdict = fallback.classify_text_now("marked as nsfw by the author");

        assert!(verdict.should_rewrite());
        assert_eq!(verdict.replacement.as_deref(), Some("marked as **** by the author"));
        assert_eq!(verdict.result.method, ClassificationMethod::Fallback);

        let clean = fallback.classify_text_now("a lovely afternoon walk");
        assert!(!clean.should_rewrite());
    }

    #[test]
    fn test_text_response_uses_backend_rewrite() {
        let response: TextResponse = serde_json::from_value(serde_json::json!({
            "original": "that was truly vile stuff",
            "filtered": "that was truly **** stuff",
            "hasExplicitContent": true,
            "ai": {"isExplicit": false, "confidence": 0.2, "categories": [], "detectedTerms": []}
        }))
        .unwrap();

        let verdict = response.into_verdict("that was truly vile stuff");
        assert!(verdict.result.is_explicit);
        assert_eq!(verdict.replacement.as_deref(), Some("that was truly **** stuff"));
        assert_eq!(verdict.result.method, ClassificationMethod::RemotePrimary);
    }

    #[test]
    fn test_text_response_masks_detected_terms() {
        let response: TextResponse = serde_json::from_value(serde_json::json!({
            "original": "you absolute menace",
            "filtered": "you absolute menace",
            "hasExplicitContent": false,
            "ai": {"isExplicit": true, "confidence": 0.9, "categories": ["harassment"], "detectedTerms": ["menace"]}
        }))
        .unwrap();

        let verdict = response.into_verdict("you absolute menace");
        assert_eq!(verdict.replacement.as_deref(), Some("you absolute ******"));
        assert_eq!(verdict.matched_terms, vec!["menace"]);
    }

    #[test]
    fn test_text_response_masks_everything_without_terms() {
        let response: TextResponse = serde_json::from_value(serde_json::json!({
            "ai": {"confidence": 0.1, "categories": ["Violence"]}
        }))
        .unwrap();

        let verdict = response.into_verdict("go away now");
        assert_eq!(verdict.replacement.as_deref(), Some("** **** ***"));
    }

    #[test]
    fn test_text_response_clean() {
        let response: TextResponse = serde_json::from_value(serde_json::json!({
            "original": "hello there friend",
            "filtered": "hello there friend",
            "hasExplicitContent": false,
            "ai": {"isExplicit": false, "confidence": 0.05, "categories": ["greeting"], "detectedTerms": []}
        }))
        .unwrap();

        let verdict = response.into_verdict("hello there friend");
        assert!(!verdict.result.is_explicit);
        assert!(verdict.replacement.is_none());
    }

    #[test]
    fn test_image_response_raw_scores() {
        let response: ImageResponse = serde_json::from_value(serde_json::json!({"adult": 0.9})).unwrap();
        let result = response.into_result(ImageFilterMethod::Auto);

        assert!(result.should_filter());
        assert!(result.has_category("adult"));
        assert_eq!(result.confidence, 0.9);
        assert_eq!(result.method, ClassificationMethod::RemotePrimary);
    }

    #[test]
    fn test_image_response_aggregate_fields() {
        let response: ImageResponse = serde_json::from_value(serde_json::json!({
            "shouldFilter": true,
            "confidence": 0.85,
            "categories": ["racy"],
            "safeScore": 0.15,
            "method": "deepai"
        }))
        .unwrap();
        let result = response.into_result(ImageFilterMethod::Auto);

        assert!(result.should_filter());
        assert_eq!(result.categories, vec!["racy"]);
        assert_eq!(result.safe_score, 0.15);
        assert_eq!(result.method, ClassificationMethod::RemoteSecondary);
    }

    #[test]
    fn test_image_response_nested_scores() {
        let response: ImageResponse = serde_json::from_value(serde_json::json!({
            "shouldFilter": false,
            "scores": {"violence": 0.75, "medical": 0.8}
        }))
        .unwrap();
        let result = response.into_result(ImageFilterMethod::DeepAi);

        assert!(result.should_filter());
        assert_eq!(result.categories, vec!["violence", "medical"]);
        assert_eq!(result.method, ClassificationMethod::RemoteSecondary);
    }

    #[test]
    fn test_image_response_safe() {
        let response: ImageResponse =
            serde_json::from_value(serde_json::json!({"shouldFilter": false, "safeScore": 0.95})).unwrap();
        let result = response.into_result(ImageFilterMethod::Vertex);

        assert!(!result.should_filter());
        assert!(result.categories.is_empty());
    }

    #[test]
    fn test_parse_api_url() {
        assert!(parse_api_url("http://localhost:3000").is_ok());
        assert!(parse_api_url(" https://api.socio.io/ ").is_ok());
        assert!(matches!(parse_api_url("localhost"), Err(NetworkError::InvalidUrl(_))));
        assert!(matches!(parse_api_url("ftp://x.org"), Err(NetworkError::InvalidUrl(_))));
    }

    #[test]
    fn test_health_status() {
        let status: HealthStatus =
            serde_json::from_value(serde_json::json!({"status": "ok", "uptime": 12})).unwrap();
        assert!(status.is_ok());
        assert_eq!(status.details["uptime"], 12);
    }

    #[tokio::test]
    async fn test_unreachable_backend_falls_back() {
        let settings = ScanSettings::default().with_request_timeout(Duration::from_secs(2));
        let classifier =
            RemoteClassifier::new("http://127.0.0.1:1", &settings, FallbackClassifier::default()).unwrap();

        let image = ImagePayload::new(vec![1, 2, 3], 728, 90);
        let first = classifier.classify_image(&image, ImageFilterMethod::Auto).await;
        let second = classifier.classify_image(&image, ImageFilterMethod::Auto).await;

        assert_eq!(first, second);
        assert!(first.should_filter());
        assert_eq!(first.method, ClassificationMethod::Fallback);

        let verdict = classifier.classify_text("this is vulgar talk").await;
        assert_eq!(verdict.replacement.as_deref(), Some("this is ****** talk"));
        assert_eq!(verdict.result.method, ClassificationMethod::Fallback);
    }
}
