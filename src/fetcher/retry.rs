//! Bounded retry with exponential backoff for transient fetch failures.
//!
//! Every remote call the harvester makes (index pages and item details) goes
//! through [`with_retry`]. Only failures classified as retryable are retried;
//! everything else is returned on the first attempt.

use super::{FetcherError, FetcherResult};
use crate::harvester::config::{INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RETRIES};
use crate::shutdown::InterruptCoordinator;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Classification of fetch errors for retry decisions and log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request timed out
    NetworkTimeout,
    /// Connection refused, reset, or DNS failure
    NetworkOffline,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// Other 4xx
    ClientError(u16),
    /// Body could not be parsed or had an unexpected shape
    Malformed,
    /// Body over the byte ceiling
    TooLarge,
}

impl RetryErrorType {
    /// Short description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                410 => "resource gone",
                _ => "client error",
            },
            Self::Malformed => "malformed response",
            Self::TooLarge => "response too large",
        }
    }

    /// Whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::NetworkOffline | Self::RateLimit | Self::ServerError(_)
        )
    }
}

impl FetcherError {
    /// Retry classification of this error
    pub fn retry_class(&self) -> RetryErrorType {
        match self {
            Self::Timeout(_) => RetryErrorType::NetworkTimeout,
            Self::NetworkError(_) => RetryErrorType::NetworkOffline,
            Self::HttpError { status: 429, .. } => RetryErrorType::RateLimit,
            Self::HttpError { status, .. } if *status >= 500 => RetryErrorType::ServerError(*status),
            Self::HttpError { status, .. } => RetryErrorType::ClientError(*status),
            Self::ParseError(_) | Self::InvalidResponse(_) => RetryErrorType::Malformed,
            Self::TooLarge { .. } => RetryErrorType::TooLarge,
        }
    }
}

/// Retry budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Cap on any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Exponential backoff before retry number `retry_count` (0-based)
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_count);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Run `operation`, retrying transient failures according to `policy`.
///
/// When `interrupt` is given, an interrupt delivered during a backoff sleep
/// abandons the remaining retries and returns the last error, so a draining
/// run is not held up by a failing remote.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    interrupt: Option<&InterruptCoordinator>,
    context: &str,
    mut operation: F,
) -> FetcherResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetcherResult<T>>,
{
    let max_attempts = policy.max_retries + 1;
    let mut retry_count = 0u32;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if retry_count > 0 {
                    info!(
                        context,
                        attempt = retry_count + 1,
                        max_attempts,
                        "Retry attempt succeeded"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let class = error.retry_class();
        if !class.is_retryable() {
            debug!(context, error = %error, "Non-retryable error");
            return Err(error);
        }
        if retry_count >= policy.max_retries {
            warn!(
                context,
                attempts = max_attempts,
                error = %error,
                "Retries exhausted"
            );
            return Err(error);
        }

        let backoff = policy.backoff(retry_count);
        retry_count += 1;
        warn!(
            context,
            attempt = retry_count,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Retrying after {}",
            class.description()
        );
        crate::metrics::record_retry_backoff(backoff, retry_count);

        match interrupt {
            Some(coordinator) => {
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = coordinator.wait_for_interrupt() => {
                        warn!(context, "Interrupt during retry backoff, giving up on this request");
                        return Err(error);
                    }
                }
            }
            None => tokio::time::sleep(backoff).await,
        }
    }
}
