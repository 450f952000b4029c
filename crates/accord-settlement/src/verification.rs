use async_trait::async_trait;
use dashmap::DashMap;

use accord_core::{SettlementId, VerificationStatus};

use crate::error::SettlementError;

/// Source of semantic-verification outcomes for settlements that require one.
#[async_trait]
pub trait IVerificationOracle: Send + Sync {
    /// Latest outcome for a settlement, `None` if no verification record
    /// exists.
    async fn verification_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<VerificationStatus>, SettlementError>;
}

/// Oracle backed by an in-memory table.
///
/// Outcomes are written by whatever drives verification locally (operators,
/// tests).
#[derive(Default)]
pub struct InMemoryVerificationOracle {
    outcomes: DashMap<SettlementId, VerificationStatus>,
}

impl InMemoryVerificationOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, settlement_id: SettlementId, status: VerificationStatus) {
        self.outcomes.insert(settlement_id, status);
    }

    pub fn clear(&self, settlement_id: SettlementId) {
        self.outcomes.remove(&settlement_id);
    }
}

#[async_trait]
impl IVerificationOracle for InMemoryVerificationOracle {
    async fn verification_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<VerificationStatus>, SettlementError> {
        Ok(self.outcomes.get(&settlement_id).map(|s| *s))
    }
}
