//! Backend call retries
//!
//! Classification requests are retried only for failures that
//! [`NetworkError::is_transient`](crate::NetworkError::is_transient) (or a
//! caller-supplied predicate) considers worth another try. Every call is
//! bounded: one attempt plus `max_retries`, with capped exponential waits.

use std::future::Future;
use std::time::Duration;

/// How often and how patiently to retry
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Extra attempts after the first (0 means a single attempt)
    pub max_retries: usize,
    /// Wait before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    /// Growth factor between consecutive waits
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Retry up to `max_retries` times with the default waits
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Set the wait before the first retry
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Cap every wait at `delay`
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the growth factor; values below 1 are treated as 1
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Total attempts a call may make
    pub fn attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (0 is the first retry)
    pub fn delay_for(&self, retry: usize) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let scaled = self.initial_delay.as_secs_f64() * factor;

        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Run `operation` until it succeeds, `should_retry` rejects its error, or
/// the attempts run out. The last error is returned.
pub async fn retry<F, Fut, T, E>(
    config: &RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if retries == config.max_retries || !should_retry(&error) {
            return Err(error);
        }

        let delay = config.delay_for(retries);
        retries += 1;
        tracing::debug!("Backend call failed, retry {}/{} in {:?}", retries, config.max_retries, delay);
        tokio::time::sleep(delay).await;
    }
}
