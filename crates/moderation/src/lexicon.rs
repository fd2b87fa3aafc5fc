//! Local lexical filter
//!
//! Case-insensitive whole-word matching against a term list. Every match is
//! replaced by a mask of `*` with the same character length, so a rewritten
//! text always has the same character count as its source.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Terms checked locally on every text node
pub const CANONICAL_TERMS: &[&str] = &["explicit", "offensive", "profane", "vulgar", "obscene"];

/// Terms the fallback classifier uses when the backend is unavailable
pub const EXTENDED_TERMS: &[&str] = &[
    "explicit",
    "offensive",
    "profane",
    "vulgar",
    "obscene",
    "nsfw",
    "porn",
    "pornographic",
    "pornography",
    "nude",
    "nudity",
    "xxx",
    "sexual",
    "gore",
    "slur",
    "hateful",
];

/// Maximum number of terms a lexicon accepts
pub const MAX_TERMS: usize = 2000;

/// Errors that can occur while building a lexicon
#[derive(Debug, Error)]
pub enum LexiconError {
    /// Term file could not be read
    #[error("Failed to read term list {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Term list too large
    #[error("Term list too large: {count} exceeds maximum {max}")]
    TooManyTerms {
        /// Actual count
        count: usize,
        /// Maximum allowed
        max: usize,
    },

    /// Pattern failed to compile
    #[error("Invalid term pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Result type for lexicon operations
pub type Result<T> = std::result::Result<T, LexiconError>;

/// Output of [`Lexicon::filter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalMatch<'a> {
    /// Rewritten text; borrowed when nothing matched
    pub text: Cow<'a, str>,
    /// Matched terms, lowercase, in order of first occurrence
    pub matched_terms: Vec<String>,
}

impl LexicalMatch<'_> {
    /// Check if any term matched
    pub fn is_match(&self) -> bool {
        !self.matched_terms.is_empty()
    }
}

/// A compiled term list
#[derive(Debug, Clone)]
pub struct Lexicon {
    terms: Vec<String>,
    pattern: Option<Regex>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::canonical()
    }
}

impl Lexicon {
    /// Lexicon that never matches
    pub fn empty() -> Self {
        Self {
            terms: Vec::new(),
            pattern: None,
        }
    }

    /// The built-in local term list
    pub fn canonical() -> Self {
        Self::builtin(CANONICAL_TERMS)
    }

    /// The built-in fallback term list
    pub fn extended() -> Self {
        Self::builtin(EXTENDED_TERMS)
    }

    fn builtin(terms: &[&str]) -> Self {
        Self::from_terms(terms.iter().copied()).unwrap_or_else(|e| {
            tracing::error!("Built-in term list failed to compile: {}", e);
            Self::empty()
        })
    }

    /// Build a lexicon from terms. Terms are trimmed and lowercased; blanks
    /// and duplicates are dropped.
    pub fn from_terms<I, S>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !normalized.contains(&term) {
                normalized.push(term);
            }
        }

        if normalized.len() > MAX_TERMS {
            return Err(LexiconError::TooManyTerms {
                count: normalized.len(),
                max: MAX_TERMS,
            });
        }

        if normalized.is_empty() {
            return Ok(Self::empty());
        }

        // Longest first, so overlapping terms prefer the longer match
        let mut ordered: Vec<&String> = normalized.iter().collect();
        ordered.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

        let alternation = ordered
            .iter()
            .map(|term| regex::escape(term))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(r"(?i)\b(?:{})\b", alternation))?;

        Ok(Self {
            terms: normalized,
            pattern: Some(pattern),
        })
    }

    /// Parse a term list: one term per line, `#` starts a comment
    pub fn parse(source: &str) -> Result<Self> {
        Self::from_terms(
            source
                .lines()
                .map(|line| line.split('#').next().unwrap_or_default().trim())
                .filter(|line| !line.is_empty()),
        )
    }

    /// Load a term list from a file
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let lexicon = Self::parse(&source)?;
        tracing::debug!("Loaded {} terms from {}", lexicon.len(), path.display());
        Ok(lexicon)
    }

    /// Combine two lexicons
    pub fn merge(&self, other: &Lexicon) -> Result<Self> {
        Self::from_terms(self.terms.iter().chain(other.terms.iter()))
    }

    /// Terms in this lexicon
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of terms
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Check if the lexicon has no terms
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Check if any term occurs in `text`
    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }

    /// Mask every term occurrence in `text`
    pub fn filter<'a>(&self, text: &'a str) -> LexicalMatch<'a> {
        let Some(pattern) = &self.pattern else {
            return LexicalMatch {
                text: Cow::Borrowed(text),
                matched_terms: Vec::new(),
            };
        };

        let mut matched_terms: Vec<String> = Vec::new();
        let rewritten = pattern.replace_all(text, |caps: &Captures<'_>| {
            let found = &caps[0];
            let term = found.to_lowercase();
            if !matched_terms.contains(&term) {
                matched_terms.push(term);
            }
            mask(found)
        });

        LexicalMatch {
            text: rewritten,
            matched_terms,
        }
    }
}

/// A run of `*` as long as `value`, in characters
pub fn mask(value: &str) -> String {
    "*".repeat(value.chars().count())
}

/// Mask every non-whitespace character, keeping whitespace in place
pub fn mask_all(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { c } else { '*' })
        .collect()
}
