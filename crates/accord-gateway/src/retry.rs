//! Bounded retry with exponential backoff for ledger calls.
//!
//! Transient errors (transport, timeout, 5xx) are retried; permanent ones are
//! returned immediately. With the defaults the delays are 1s then 2s.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{GatewayError, LedgerError};

/// How many times to try one logical operation, and how long to wait between
/// tries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 are treated as 1.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Delay before the second attempt; doubles for each further attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// Backoff after the failed attempt with 0-based index `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(2u64.saturating_pow(attempt)),
        )
    }

    /// Upper bound on the time spent sleeping for one operation.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.attempts.max(1) - 1).map(|i| self.delay_for(i)).sum()
    }
}

/// Call `f` until it succeeds, a permanent error occurs, or the policy's
/// attempts are used up. The last error is returned as
/// [`GatewayError::Ledger`].
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    endpoint: &str,
    operation: &'static str,
    f: F,
) -> Result<T, GatewayError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let made = attempt + 1;
                if !e.is_transient() || made >= attempts {
                    return Err(GatewayError::Ledger {
                        endpoint: endpoint.to_string(),
                        operation,
                        attempts: made,
                        source: e,
                    });
                }
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    endpoint,
                    operation,
                    attempt = made,
                    max_attempts = attempts,
                    "ledger call failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
