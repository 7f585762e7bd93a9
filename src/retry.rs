//! Retry logic with exponential backoff
//!
//! Source downloaders wrap each object fetch in [`download_with_retry`] so that
//! transient faults (timeouts, refused connections, 5xx answers) do not fail a
//! whole partition. Anything still failing after the last attempt is surfaced
//! to the caller unchanged; it is never reclassified as a missing object.
//!
//! # Example
//!
//! ```no_run
//! use objaverse_dl::retry::{IsRetryable, download_with_retry};
//! use objaverse_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! download_with_retry(&config, || async { Ok::<_, MyError>(()) }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, server busy, connection reset) should return `true`.
/// Permanent failures (bad input, disk full, unexpected status) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            // Request timeout, rate limiting and server-side failures
            Error::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
            Error::Config { .. }
            | Error::InvalidSource { .. }
            | Error::SourceUnavailable { .. }
            | Error::InvalidIdentifier { .. }
            | Error::InvalidTable(_)
            | Error::Serialization(_)
            | Error::Archive { .. }
            | Error::Interrupted
            | Error::Other(_) => false,
        }
    }
}

/// Delays between attempts, growing by `backoff_multiplier` up to `max_delay`
struct Backoff<'a> {
    config: &'a RetryConfig,
    retries: u32,
    next: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            retries: 0,
            next: config.initial_delay,
        }
    }

    /// Delay before the next retry, `None` once `max_attempts` retries were spent
    fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let base = self.next;
        self.next = Duration::from_secs_f64(base.as_secs_f64() * self.config.backoff_multiplier)
            .min(self.config.max_delay);
        Some(if self.config.jitter {
            add_jitter(base)
        } else {
            base
        })
    }
}

/// Run `operation`, retrying retryable errors with exponential backoff
///
/// At most `config.max_attempts` retries follow the first attempt. The last
/// error is returned as is.
pub async fn download_with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);

    loop {
        let error = match operation().await {
            Ok(value) => {
                if backoff.retries > 0 {
                    tracing::info!(retries = backoff.retries, "fetch recovered after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(error);
        }
        let Some(delay) = backoff.next_delay() else {
            tracing::error!(error = %error, retries = backoff.retries, "giving up after retries");
            return Err(error);
        };

        tracing::warn!(
            error = %error,
            retry = backoff.retries,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

// Uniform in [delay, 2 * delay]
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    delay.mul_f64(1.0 + factor)
}
