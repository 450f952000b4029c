use std::future::Future;
use std::sync::Arc;

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, Clock, RemoteSettlementStatus, Settlement,
    SettlementId, SystemClock,
};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerStats};
use crate::error::{GatewayError, LedgerError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::traits::ILedgerGateway;

/// Ledger access with bounded retry nested inside a circuit breaker.
///
/// The whole retry loop for one logical operation runs inside a single
/// breaker `execute`, so N retries count as one breaker success or failure.
pub struct RetryingGateway {
    ledger: Arc<dyn ILedgerGateway>,
    breaker: CircuitBreaker,
    policy: RetryPolicy,
}

impl RetryingGateway {
    /// Create a gateway over `ledger` using the system clock.
    pub fn new(ledger: Arc<dyn ILedgerGateway>, policy: RetryPolicy, breaker: BreakerConfig) -> Self {
        Self::with_clock(ledger, policy, breaker, Arc::new(SystemClock))
    }

    pub fn with_clock(
        ledger: Arc<dyn ILedgerGateway>,
        policy: RetryPolicy,
        breaker: BreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let breaker = CircuitBreaker::with_clock(ledger.endpoint_id().to_string(), breaker, clock);
        tracing::info!(
            endpoint = %breaker.endpoint(),
            attempts = policy.attempts,
            base_delay_ms = policy.base_delay_ms,
            "ledger gateway ready"
        );
        Self {
            ledger,
            breaker,
            policy,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.breaker.endpoint()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn breaker_stats(&self) -> CircuitBreakerStats {
        self.breaker.stats()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let endpoint = self.breaker.endpoint();
        let result = self
            .breaker
            .execute(|| retry_with_backoff(&self.policy, endpoint, operation, f))
            .await;

        if let Err(GatewayError::CircuitOpen { retry_after, .. }) = &result {
            tracing::debug!(endpoint, operation, ?retry_after, "skipped call, circuit open");
        }
        result
    }

    pub async fn submit_settlement(&self, settlement: &Settlement) -> Result<(), GatewayError> {
        self.call("submit_settlement", || self.ledger.submit_settlement(settlement))
            .await
    }

    pub async fn get_settlement_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<RemoteSettlementStatus>, GatewayError> {
        self.call("get_settlement_status", || {
            self.ledger.get_settlement_status(settlement_id)
        })
        .await
    }

    pub async fn submit_payout(
        &self,
        settlement_id: SettlementId,
        amount: f64,
    ) -> Result<(), GatewayError> {
        self.call("submit_payout", || self.ledger.submit_payout(settlement_id, amount))
            .await
    }

    pub async fn submit_challenge(&self, challenge: &Challenge) -> Result<(), GatewayError> {
        self.call("submit_challenge", || self.ledger.submit_challenge(challenge))
            .await
    }

    pub async fn get_challenge_status(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeStatus>, GatewayError> {
        self.call("get_challenge_status", || {
            self.ledger.get_challenge_status(challenge_id)
        })
        .await
    }
}
