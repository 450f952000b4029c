use accord_core::{CoreError, SettlementId, SettlementStatus};
use accord_gateway::GatewayError;

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("settlement not found: {0}")]
    NotFound(SettlementId),

    #[error("settlement {id} is already {status}")]
    Terminal {
        id: SettlementId,
        status: SettlementStatus,
    },

    #[error("settlement {0} is being processed by another pass")]
    InFlight(SettlementId),

    #[error("settlement {0} already has a pending challenge")]
    ChallengeAlreadyPending(SettlementId),

    #[error("verification oracle error: {0}")]
    Verification(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SettlementError {
    /// Whether this error is the ledger breaker refusing calls.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::Gateway(e) if e.is_circuit_open())
    }
}
