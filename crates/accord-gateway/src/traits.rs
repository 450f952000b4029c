use async_trait::async_trait;

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, RemoteSettlementStatus, Settlement, SettlementId,
};

use crate::error::LedgerError;

/// Remote ledger interface.
///
/// Each implementation bridges Accord to a concrete ledger service. Every
/// submission is keyed by a stable id generated locally, so re-posting the
/// same record after a transient failure is safe: the ledger reconciles
/// duplicates on that id.
#[async_trait]
pub trait ILedgerGateway: Send + Sync {
    /// Record a proposed settlement on the ledger.
    async fn submit_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError>;

    /// Fetch acceptance flags, challenges, and status. `None` when unknown.
    async fn get_settlement_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<RemoteSettlementStatus>, LedgerError>;

    /// Pay out the facilitation fee for a settlement.
    async fn submit_payout(&self, settlement_id: SettlementId, amount: f64)
        -> Result<(), LedgerError>;

    /// File a challenge against a settlement.
    async fn submit_challenge(&self, challenge: &Challenge) -> Result<(), LedgerError>;

    /// Fetch a challenge's resolution status. `None` when unknown.
    async fn get_challenge_status(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeStatus>, LedgerError>;

    /// Identity of the remote endpoint; one circuit breaker per identity.
    fn endpoint_id(&self) -> &str;
}
