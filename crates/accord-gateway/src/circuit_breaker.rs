//! Per-endpoint circuit breaker.
//!
//! ## States
//!
//! CLOSED → OPEN → HALF_OPEN → CLOSED | OPEN
//!
//! There is no background timer: the cooldown is evaluated lazily when the next
//! call is attempted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use accord_core::{Clock, SystemClock};

use crate::error::GatewayError;

/// Upper bound on the configured cooldown (100 years).
const MAX_RESET_TIMEOUT_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; every call is attempted.
    Closed,
    /// Failing endpoint; calls are rejected without being attempted.
    Open,
    /// Cooldown elapsed; calls probe whether the endpoint recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures in `Closed` that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes in `HalfOpen` that close the circuit.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Cooldown after the last failure before a probe is allowed.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    2
}
fn default_reset_timeout_ms() -> u64 {
    30_000
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

/// Read-only snapshot of a breaker's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub endpoint: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub rejected_calls: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_state_change_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerCounters {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_failures: u64,
    total_successes: u64,
    rejected_calls: u64,
    last_failure_at: Option<DateTime<Utc>>,
    last_state_change_at: Option<DateTime<Utc>>,
}

impl Default for BreakerCounters {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            total_failures: 0,
            total_successes: 0,
            rejected_calls: 0,
            last_failure_at: None,
            last_state_change_at: None,
        }
    }
}

/// Circuit breaker guarding one remote endpoint.
///
/// All bookkeeping happens under a single mutex, so concurrent calls against
/// the same endpoint update the counters atomically. The mutex is never held
/// while the guarded operation runs.
pub struct CircuitBreaker {
    endpoint: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    counters: Mutex<BreakerCounters>,
}

impl CircuitBreaker {
    /// Create a closed breaker using the system clock.
    pub fn new(endpoint: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(endpoint, config, Arc::new(SystemClock))
    }

    /// Create a closed breaker reading time from `clock`.
    pub fn with_clock(
        endpoint: impl Into<String>,
        config: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            clock,
            counters: Mutex::new(BreakerCounters::default()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Current state, without applying the lazy cooldown check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let c = self.lock();
        CircuitBreakerStats {
            endpoint: self.endpoint.clone(),
            state: c.state,
            consecutive_failures: c.consecutive_failures,
            consecutive_successes: c.consecutive_successes,
            total_failures: c.total_failures,
            total_successes: c.total_successes,
            rejected_calls: c.rejected_calls,
            last_failure_at: c.last_failure_at,
            last_state_change_at: c.last_state_change_at,
        }
    }

    /// Run `operation` if the circuit admits it.
    ///
    /// Returns [`GatewayError::CircuitOpen`] without running the operation
    /// while the circuit is open. Otherwise the operation's outcome is
    /// recorded as exactly one success or one failure.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(e)
            }
        }
    }

    /// Admit or reject a call, moving `Open → HalfOpen` once the cooldown
    /// has elapsed.
    fn try_acquire(&self) -> Result<(), GatewayError> {
        let now = self.clock.now();
        let mut c = self.lock();
        if c.state != CircuitState::Open {
            return Ok(());
        }

        let reset_ms = self.config.reset_timeout_ms.min(MAX_RESET_TIMEOUT_MS);
        let reset = chrono::Duration::milliseconds(reset_ms as i64);
        let elapsed = c
            .last_failure_at
            .map(|at| now - at)
            .unwrap_or(reset);

        if elapsed >= reset {
            c.state = CircuitState::HalfOpen;
            c.consecutive_successes = 0;
            c.last_state_change_at = Some(now);
            tracing::info!(endpoint = %self.endpoint, "circuit half-open, probing endpoint");
            return Ok(());
        }

        c.rejected_calls += 1;
        let retry_after = (reset - elapsed).to_std().unwrap_or(Duration::ZERO);
        Err(GatewayError::CircuitOpen {
            endpoint: self.endpoint.clone(),
            retry_after,
        })
    }

    fn on_success(&self) {
        let now = self.clock.now();
        let mut c = self.lock();
        c.total_successes += 1;
        c.consecutive_failures = 0;

        if c.state == CircuitState::HalfOpen {
            c.consecutive_successes += 1;
            if c.consecutive_successes >= self.config.success_threshold {
                c.state = CircuitState::Closed;
                c.consecutive_successes = 0;
                c.last_state_change_at = Some(now);
                tracing::info!(endpoint = %self.endpoint, "circuit closed, endpoint recovered");
            }
        }
    }

    fn on_failure(&self) {
        let now = self.clock.now();
        let mut c = self.lock();
        c.total_failures += 1;
        c.consecutive_failures += 1;
        c.consecutive_successes = 0;
        c.last_failure_at = Some(now);

        let open = match c.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => c.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if open {
            c.state = CircuitState::Open;
            c.last_state_change_at = Some(now);
            tracing::warn!(
                endpoint = %self.endpoint,
                consecutive_failures = c.consecutive_failures,
                reset_timeout_ms = self.config.reset_timeout_ms,
                "circuit opened"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCounters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
