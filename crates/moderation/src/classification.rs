//! Classification results and the thresholds that produce them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image score above which content counts as adult
pub const ADULT_THRESHOLD: f64 = 0.7;
/// Image score above which content counts as violent
pub const VIOLENCE_THRESHOLD: f64 = 0.7;
/// Image score above which content counts as racy
pub const RACY_THRESHOLD: f64 = 0.8;
/// Image safe score below which content is filtered
pub const SAFE_THRESHOLD: f64 = 0.5;
/// Image score above which the `medical` category is reported (never filters)
pub const MEDICAL_THRESHOLD: f64 = 0.7;
/// Text confidence above which content is explicit
pub const TEXT_CONFIDENCE_THRESHOLD: f64 = 0.7;
/// Confidence attached to heuristic and wordlist fallback hits
pub const FALLBACK_CONFIDENCE: f64 = 0.8;

/// Text categories that are explicit regardless of confidence
pub const EXPLICIT_TEXT_CATEGORIES: &[&str] = &["adult", "violence", "hate_speech", "harassment"];

/// Which path produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationMethod {
    /// Built-in wordlist
    Local,
    /// Backend, primary provider
    RemotePrimary,
    /// Backend, secondary provider
    RemoteSecondary,
    /// Local fallback after the backend was unavailable or not configured
    Fallback,
}

impl ClassificationMethod {
    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassificationMethod::Local => "local",
            ClassificationMethod::RemotePrimary => "remote-primary",
            ClassificationMethod::RemoteSecondary => "remote-secondary",
            ClassificationMethod::Fallback => "fallback",
        }
    }

    /// Label shown on the image overlay
    pub fn display_name(&self) -> &'static str {
        match self {
            ClassificationMethod::Local => "Local",
            ClassificationMethod::RemotePrimary => "Vertex AI",
            ClassificationMethod::RemoteSecondary => "DeepAI",
            ClassificationMethod::Fallback => "Local fallback",
        }
    }

    /// Check if the result came from the backend
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ClassificationMethod::RemotePrimary | ClassificationMethod::RemoteSecondary
        )
    }
}

impl fmt::Display for ClassificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Whether the content should be filtered
    pub is_explicit: bool,
    /// Confidence in 0..=1
    pub confidence: f64,
    /// Categories reported for the content
    pub categories: Vec<String>,
    /// Safety score in 0..=1
    pub safe_score: f64,
    /// Path that produced this result
    pub method: ClassificationMethod,
}

impl ClassificationResult {
    /// A result that filters nothing
    pub fn safe(method: ClassificationMethod) -> Self {
        Self {
            is_explicit: false,
            confidence: 0.0,
            categories: Vec::new(),
            safe_score: 1.0,
            method,
        }
    }

    /// A filtering result
    pub fn explicit(confidence: f64, categories: Vec<String>, method: ClassificationMethod) -> Self {
        let confidence = clamp_unit(confidence);
        Self {
            is_explicit: true,
            confidence,
            categories,
            safe_score: 1.0 - confidence,
            method,
        }
    }

    /// Same as `is_explicit`; the name the image pipeline uses
    pub fn should_filter(&self) -> bool {
        self.is_explicit
    }

    /// Confidence as a rounded percentage
    pub fn confidence_percent(&self) -> u32 {
        (clamp_unit(self.confidence) * 100.0).round() as u32
    }

    /// Check if a category was reported (case-insensitive)
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Text is explicit when confidence is high or any category is explicit
pub fn text_is_explicit<S: AsRef<str>>(confidence: f64, categories: &[S]) -> bool {
    confidence > TEXT_CONFIDENCE_THRESHOLD
        || categories.iter().any(|category| {
            EXPLICIT_TEXT_CATEGORIES
                .iter()
                .any(|explicit| category.as_ref().eq_ignore_ascii_case(explicit))
        })
}

/// Raw per-category image scores
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageScores {
    /// Adult content score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adult: Option<f64>,
    /// Violence score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violence: Option<f64>,
    /// Racy content score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub racy: Option<f64>,
    /// Medical content score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical: Option<f64>,
    /// Safety score; missing means safe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safe: Option<f64>,
}

impl ImageScores {
    /// Fill unset fields from `other`
    pub fn or(self, other: ImageScores) -> ImageScores {
        ImageScores {
            adult: self.adult.or(other.adult),
            violence: self.violence.or(other.violence),
            racy: self.racy.or(other.racy),
            medical: self.medical.or(other.medical),
            safe: self.safe.or(other.safe),
        }
    }

    /// Check if no score is set
    pub fn is_empty(&self) -> bool {
        *self == ImageScores::default()
    }

    /// Highest of the adult, violence and racy scores
    pub fn max_score(&self) -> f64 {
        [self.adult, self.violence, self.racy]
            .into_iter()
            .flatten()
            .fold(0.0, f64::max)
    }

    /// Categories whose score passes its threshold
    pub fn categories(&self) -> Vec<String> {
        let mut categories = Vec::new();
        let checks = [
            ("adult", self.adult, ADULT_THRESHOLD),
            ("violence", self.violence, VIOLENCE_THRESHOLD),
            ("racy", self.racy, RACY_THRESHOLD),
            ("medical", self.medical, MEDICAL_THRESHOLD),
        ];
        for (name, score, threshold) in checks {
            if score.is_some_and(|s| s > threshold) {
                categories.push(name.to_string());
            }
        }
        categories
    }

    /// Check the filtering thresholds
    pub fn should_filter(&self) -> bool {
        self.adult.is_some_and(|s| s > ADULT_THRESHOLD)
            || self.violence.is_some_and(|s| s > VIOLENCE_THRESHOLD)
            || self.racy.is_some_and(|s| s > RACY_THRESHOLD)
            || self.safe.unwrap_or(1.0) < SAFE_THRESHOLD
    }

    /// Turn scores into a result
    pub fn evaluate(&self, method: ClassificationMethod) -> ClassificationResult {
        let confidence = clamp_unit(self.max_score());
        ClassificationResult {
            is_explicit: self.should_filter(),
            confidence,
            categories: self.categories(),
            safe_score: clamp_unit(self.safe.unwrap_or(1.0 - confidence)),
            method,
        }
    }
}

/// A text verdict: the classification plus the text to substitute
#[derive(Debug, Clone, PartialEq)]
pub struct TextVerdict {
    /// Classification
    pub result: ClassificationResult,
    /// Replacement text; set only when the content is explicit and the
    /// replacement differs from the original
    pub replacement: Option<String>,
    /// Terms the classifier flagged
    pub matched_terms: Vec<String>,
}

impl TextVerdict {
    /// A verdict that leaves the text alone
    pub fn clean(method: ClassificationMethod) -> Self {
        Self {
            result: ClassificationResult::safe(method),
            replacement: None,
            matched_terms: Vec::new(),
        }
    }

    /// Check if the verdict rewrites the text
    pub fn should_rewrite(&self) -> bool {
        self.result.is_explicit && self.replacement.is_some()
    }
}
