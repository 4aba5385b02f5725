//! Retry policies for provider calls.
//!
//! A failure is retried only when its [`ErrorKind`] is in the policy's
//! retryable set; anything else surfaces after the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use gbatch_providers::{ErrorKind, ProviderError};

use crate::metrics::record_retry;

/// Kinds retried on image generation.
pub const GENERATION_RETRYABLE: &[ErrorKind] = &[
    ErrorKind::GatewayTimeout,
    ErrorKind::Timeout,
    ErrorKind::ServerError,
];

/// Kinds retried on video generation.
pub const VIDEO_RETRYABLE: &[ErrorKind] = &[ErrorKind::GatewayTimeout, ErrorKind::Timeout];

/// Kinds left untouched in the store at the job boundary.
pub const TRANSIENT_KINDS: &[ErrorKind] = &[
    ErrorKind::GatewayTimeout,
    ErrorKind::Timeout,
    ErrorKind::ServerError,
    ErrorKind::Throttled,
];

/// Attempt budget, delays and retryable kinds for one kind of call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the n-th failed attempt; the last entry repeats.
    pub delays: Vec<Duration>,
    pub retryable: &'static [ErrorKind],
    /// Operation name for logging.
    pub operation: &'static str,
}

impl RetryPolicy {
    /// 3 attempts, 1s/2s/4s backoff.
    pub fn generation() -> Self {
        Self {
            max_attempts: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            retryable: GENERATION_RETRYABLE,
            operation: "generate",
        }
    }

    /// 2 attempts, fixed 5s delay.
    pub fn video() -> Self {
        Self {
            max_attempts: 2,
            delays: vec![Duration::from_secs(5)],
            retryable: VIDEO_RETRYABLE,
            operation: "generate_video",
        }
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let index = (attempt.saturating_sub(1) as usize).min(self.delays.len().saturating_sub(1));
        self.delays.get(index).copied().unwrap_or(Duration::ZERO)
    }
}

/// Result of a retried operation.
#[derive(Debug)]
pub enum RetryResult<T> {
    Success { value: T, attempts: u32 },
    Failed { error: ProviderError, attempts: u32 },
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. } | RetryResult::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, ProviderError> {
        match self {
            RetryResult::Success { value, .. } => Ok(value),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable kind, or
/// the attempt budget runs out. The closure receives the 1-based attempt.
pub async fn retry_async<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> RetryResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 1u32;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryResult::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(e) if attempt < policy.max_attempts && policy.is_retryable(e.kind) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    operation = policy.operation,
                    attempt = attempt,
                    kind = e.kind.as_str(),
                    delay_ms = delay.as_millis() as u64,
                    "Retryable failure: {}",
                    e
                );
                record_retry(policy.operation);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(
                    operation = policy.operation,
                    attempts = attempt,
                    kind = e.kind.as_str(),
                    "Giving up: {}",
                    e
                );
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt,
                };
            }
        }
    }
}
