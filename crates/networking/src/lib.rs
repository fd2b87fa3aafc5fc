//! Networking utilities for the Socio.io content filter
//!
//! This crate provides the HTTP client used to reach the moderation backend,
//! with timeout handling, typed errors and retry logic.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod retry;

pub use client::{HttpClient, HttpClientConfig};
pub use error::{NetworkError, Result};
pub use retry::{retry, RetryConfig};
