//! Retry policy for failed parts
//!
//! A failed transfer or relocation is terminal unless the configured
//! [`RetryPolicy`] asks for another attempt. The default, [`NoRetry`], keeps
//! every failure final. [`BackoffRetry`] retries transient failures with
//! exponential backoff and optional jitter.
//!
//! # Example
//!
//! ```
//! use shelf_dl::config::RetryConfig;
//! use shelf_dl::retry::{BackoffRetry, NoRetry, RetryPolicy};
//! use std::sync::Arc;
//!
//! let policy: Arc<dyn RetryPolicy> = Arc::new(BackoffRetry::new(RetryConfig::default()));
//! let never: Arc<dyn RetryPolicy> = Arc::new(NoRetry);
//! # let _ = (policy, never);
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use crate::types::DownloadItemPart;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset, 5xx and 429 answers)
/// return `true`. Permanent failures (4xx answers, relocation refused,
/// validation) return `false`. Free-text reasons are never inspected.
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
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Error::TransferFailed { .. } => false,
            Error::RelocationFailed { .. } => false,
            Error::EmptyItemRejected { .. } => false,
            Error::OwnerNotFound { .. } => false,
            Error::Config { .. } => false,
            Error::Database(_) | Error::Sqlx(_) => false,
            Error::Serialization(_) => false,
            Error::ShuttingDown => false,
            Error::NotSupported(_) => false,
        }
    }
}

/// A part failure handed to a [`RetryPolicy`]
#[derive(Debug)]
pub struct PartFailure<'a> {
    /// The part in the state it failed in; `attempts` counts retries already spent
    pub part: &'a DownloadItemPart,
    /// Why it failed
    pub error: &'a Error,
}

/// Decides whether a failed part gets another attempt
pub trait RetryPolicy: Send + Sync {
    /// `Some(delay)` re-queues the part after `delay`; `None` makes the failure final
    fn next_delay(&self, failure: &PartFailure<'_>) -> Option<Duration>;
}

/// Every failure is final
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _failure: &PartFailure<'_>) -> Option<Duration> {
        None
    }
}

/// Exponential backoff for retryable errors
pub struct BackoffRetry {
    config: RetryConfig,
}

impl BackoffRetry {
    /// Create a policy from retry settings
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Base delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self.config.backoff_multiplier.powi(attempt.min(32) as i32);
        let secs = (self.config.initial_delay.as_secs_f64() * factor)
            .min(self.config.max_delay.as_secs_f64())
            .max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(self.config.max_delay)
    }
}

impl RetryPolicy for BackoffRetry {
    fn next_delay(&self, failure: &PartFailure<'_>) -> Option<Duration> {
        if !failure.error.is_retryable() || failure.part.attempts >= self.config.max_attempts {
            return None;
        }

        let delay = self.backoff_delay(failure.part.attempts);
        Some(if self.config.jitter {
            add_jitter(delay)
        } else {
            delay
        })
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay,
/// so the result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor)).unwrap_or(delay)
}
