//! Retry logic with exponential backoff
//!
//! Used by the stream service for transient transport failures. The sync core itself
//! never retries: a failed page is fatal to the session and recovery is a fresh sync.
//!
//! # Example
//!
//! ```no_run
//! use feedsync::config::RetryConfig;
//! use feedsync::retry::with_retry;
//! use feedsync::TransportError;
//!
//! # async fn example() -> Result<(), TransportError> {
//! let config = RetryConfig::default();
//! let body = with_retry(&config, || async {
//!     // A 503 here would be retried; a 401 would be returned at once
//!     Ok::<_, TransportError>("page".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransportError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx, 429) should return `true`.
/// Permanent failures (bad credentials, undecodable pages, store errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout(_) | TransportError::Request(_) => true,
            // Server-side trouble and throttling clear up on their own
            TransportError::Http { status, .. } => *status == 429 || *status >= 500,
            TransportError::Unauthorized(_) | TransportError::Decode(_) => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
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
            Error::Grouping(_)
            | Error::Store(_)
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Config { .. }
            | Error::Queue(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Delay schedule for one retried call
///
/// Starts at `initial_delay`, grows by `backoff_multiplier` after every attempt and
/// never exceeds `max_delay`. Jitter is applied per sleep, not to the schedule.
#[derive(Debug)]
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

    /// The sleep before the next attempt, or `None` once the budget is spent
    fn next_delay(&mut self) -> Option<Duration> {
        if self.retries >= self.config.max_attempts {
            return None;
        }
        self.retries += 1;

        let base = self.next;
        self.next = base
            .mul_f64(self.config.backoff_multiplier)
            .min(self.config.max_delay);

        Some(if self.config.jitter {
            add_jitter(base)
        } else {
            base
        })
    }
}

/// Run `operation`, retrying transient failures with exponential backoff
///
/// `config.max_attempts` counts retries, so the operation runs at most
/// `max_attempts + 1` times. Permanent errors come back on the first failure; transient
/// ones come back once the retry budget is spent.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
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
                    tracing::info!(retries = backoff.retries, "Request succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(error = %error, "Permanent failure, not retrying");
            return Err(error);
        }

        match backoff.next_delay() {
            Some(delay) => {
                tracing::warn!(
                    error = %error,
                    retry = backoff.retries,
                    max_retries = config.max_attempts,
                    delay = ?delay,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None => {
                tracing::error!(
                    error = %error,
                    retries = backoff.retries,
                    "Giving up after exhausting retries"
                );
                return Err(error);
            }
        }
    }
}

/// Spread `delay` over `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(1.0..=2.0);
    delay.mul_f64(factor)
}
