//! Network error types

use thiserror::Error;

/// Errors returned by [`crate::HttpClient`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// Base URL or request path could not be turned into a URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Connection-level failure
    #[error("Request failed: {0}")]
    Request(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// Response body was not the expected payload
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Client could not be constructed
    #[error("Client setup failed: {0}")]
    Setup(String),
}

impl NetworkError {
    /// Check if the error is worth retrying
    ///
    /// Connection failures, timeouts and the usual gateway/overload statuses
    /// are transient; anything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Request(_) | NetworkError::Timeout => true,
            NetworkError::Status { status, .. } => {
                matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504 | 522 | 524)
            }
            NetworkError::InvalidUrl(_) | NetworkError::Decode(_) | NetworkError::Setup(_) => false,
        }
    }

    /// HTTP status, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            NetworkError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            NetworkError::Timeout
        } else if error.is_decode() {
            NetworkError::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            NetworkError::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else {
            NetworkError::Request(error.to_string())
        }
    }
}

/// Result type for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;
