//! Retry wrapper for external calls
//!
//! Retries only failures marked transient (HTTP 429, 5xx, transport errors),
//! with exponential backoff from [`RetryPolicy`]. The default policy makes a
//! single attempt, so a run without a `[retry]` section never retries.
//!
//! **Backoff Strategy:**
//! - Delay before retry *n* = `initial_backoff_ms * 2^(n-1)`, capped at `max_backoff_ms`
//! - A server-supplied `Retry-After` replaces the computed delay (same cap)

use popsongs_common::config::RetryPolicy;
use std::future::Future;
use std::time::Duration;

/// One failed attempt at an external call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub message: String,
    pub transient: bool,
    pub retry_after: Option<Duration>,
}

impl CallFailure {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
            retry_after: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
            retry_after: None,
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        Self {
            message,
            transient: is_transient_status(status),
            retry_after,
        }
    }
}

/// 429 and every 5xx are worth another attempt
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Run `call` until it succeeds, fails permanently, or the policy's attempts
/// are exhausted. Returns the last failure.
pub async fn retry_transient<F, Fut, T>(
    operation: &str,
    policy: &RetryPolicy,
    mut call: F,
) -> Result<T, CallFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallFailure>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if attempt > 1 {
            tracing::debug!(operation, attempt, "Retrying call");
        }

        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(failure) => {
                if !failure.transient {
                    return Err(failure);
                }
                if attempt >= policy.max_attempts {
                    if policy.max_attempts > 1 {
                        tracing::error!(
                            operation,
                            attempt,
                            error = %failure.message,
                            "Giving up: max attempts exhausted"
                        );
                    }
                    return Err(failure);
                }

                let delay = retry_delay(policy, attempt, &failure);

                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %failure.message,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Delay before the attempt after `attempt`
///
/// A server-supplied `Retry-After` wins over the computed backoff; both are
/// capped at `max_backoff_ms`.
pub fn retry_delay(policy: &RetryPolicy, attempt: u32, failure: &CallFailure) -> Duration {
    match failure.retry_after {
        Some(after) => after.min(Duration::from_millis(policy.max_backoff_ms)),
        None => policy.backoff(attempt),
    }
}
