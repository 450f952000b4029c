use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, RemoteSettlementStatus, Settlement, SettlementId,
    SettlementStatus,
};

use crate::error::LedgerError;
use crate::traits::ILedgerGateway;

/// The five remote operations, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    SubmitSettlement,
    GetSettlementStatus,
    SubmitPayout,
    SubmitChallenge,
    GetChallengeStatus,
}

/// Ledger-side record for a settlement.
#[derive(Debug, Clone)]
struct LedgerSettlement {
    settlement: Settlement,
    party_a_accepted: bool,
    party_b_accepted: bool,
    status: SettlementStatus,
    challenge_ids: Vec<ChallengeId>,
}

/// In-process ledger.
///
/// Stores submissions in memory and lets the caller script what the remote
/// side would do: parties accepting, challenges being resolved, outages.
/// Duplicate submissions are reconciled on the settlement / challenge id, the
/// same way the real ledger does. Used for local development when no ledger
/// endpoint is configured, and throughout the test suites.
pub struct InMemoryLedger {
    settlements: DashMap<SettlementId, LedgerSettlement>,
    challenges: DashMap<ChallengeId, Challenge>,
    /// Amount paid per settlement; a second payout for the same id is a no-op.
    payouts: DashMap<SettlementId, f64>,
    /// Remaining injected transient failures per operation.
    fail_next: DashMap<LedgerOp, u32>,
    unavailable: AtomicBool,
    calls: DashMap<LedgerOp, u64>,
}

impl InMemoryLedger {
    /// Create an empty, healthy ledger.
    pub fn new() -> Self {
        Self {
            settlements: DashMap::new(),
            challenges: DashMap::new(),
            payouts: DashMap::new(),
            fail_next: DashMap::new(),
            unavailable: AtomicBool::new(false),
            calls: DashMap::new(),
        }
    }

    /// Make the next `count` calls of `op` fail with a transport error.
    pub fn fail_next(&self, op: LedgerOp, count: u32) {
        self.fail_next.insert(op, count);
    }

    /// Make every call fail with a transport error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of calls received for `op`, failed ones included.
    pub fn call_count(&self, op: LedgerOp) -> u64 {
        self.calls.get(&op).map(|v| *v).unwrap_or(0)
    }

    /// Record acceptance by either party. Flags only ever turn on.
    pub fn accept(&self, settlement_id: SettlementId, party_a: bool, party_b: bool) {
        if let Some(mut entry) = self.settlements.get_mut(&settlement_id) {
            entry.party_a_accepted |= party_a;
            entry.party_b_accepted |= party_b;
        }
    }

    /// Resolve a challenge, as the ledger's consensus process would.
    pub fn resolve_challenge(&self, challenge_id: ChallengeId, status: ChallengeStatus) {
        if let Some(mut entry) = self.challenges.get_mut(&challenge_id) {
            entry.status = status;
        }
    }

    /// Override the ledger-side settlement status.
    pub fn set_settlement_status(&self, settlement_id: SettlementId, status: SettlementStatus) {
        if let Some(mut entry) = self.settlements.get_mut(&settlement_id) {
            entry.status = status;
        }
    }

    /// The amount paid out for a settlement, if any.
    pub fn payout_for(&self, settlement_id: SettlementId) -> Option<f64> {
        self.payouts.get(&settlement_id).map(|v| *v)
    }

    /// The settlement as stored on the ledger.
    pub fn settlement(&self, settlement_id: SettlementId) -> Option<Settlement> {
        self.settlements
            .get(&settlement_id)
            .map(|entry| entry.settlement.clone())
    }

    pub fn challenge(&self, challenge_id: ChallengeId) -> Option<Challenge> {
        self.challenges.get(&challenge_id).map(|entry| entry.clone())
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.len()
    }

    /// Count the call and decide whether it should fail.
    fn enter(&self, op: LedgerOp) -> Result<(), LedgerError> {
        *self.calls.entry(op).or_insert(0) += 1;

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("ledger unavailable".into()));
        }
        if let Some(mut remaining) = self.fail_next.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::Transport(format!("injected failure for {op:?}")));
            }
        }
        Ok(())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ILedgerGateway for InMemoryLedger {
    async fn submit_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        self.enter(LedgerOp::SubmitSettlement)?;
        self.settlements
            .entry(settlement.id)
            .or_insert_with(|| LedgerSettlement {
                settlement: settlement.clone(),
                party_a_accepted: false,
                party_b_accepted: false,
                status: SettlementStatus::Proposed,
                challenge_ids: Vec::new(),
            });
        tracing::debug!(settlement_id = %settlement.id, "memory ledger: settlement recorded");
        Ok(())
    }

    async fn get_settlement_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<RemoteSettlementStatus>, LedgerError> {
        self.enter(LedgerOp::GetSettlementStatus)?;
        let Some(entry) = self.settlements.get(&settlement_id) else {
            return Ok(None);
        };
        let challenges = entry
            .challenge_ids
            .iter()
            .filter_map(|id| self.challenges.get(id).map(|c| c.clone()))
            .collect();
        Ok(Some(RemoteSettlementStatus {
            party_a_accepted: entry.party_a_accepted,
            party_b_accepted: entry.party_b_accepted,
            challenges,
            status: entry.status,
        }))
    }

    async fn submit_payout(&self, settlement_id: SettlementId, amount: f64) -> Result<(), LedgerError> {
        self.enter(LedgerOp::SubmitPayout)?;
        let Some(mut entry) = self.settlements.get_mut(&settlement_id) else {
            return Err(LedgerError::Rejected {
                status: 404,
                message: format!("unknown settlement {settlement_id}"),
            });
        };
        self.payouts.entry(settlement_id).or_insert(amount);
        entry.status = SettlementStatus::Closed;
        tracing::debug!(settlement_id = %settlement_id, amount, "memory ledger: payout recorded");
        Ok(())
    }

    async fn submit_challenge(&self, challenge: &Challenge) -> Result<(), LedgerError> {
        self.enter(LedgerOp::SubmitChallenge)?;
        let Some(mut entry) = self.settlements.get_mut(&challenge.settlement_id) else {
            return Err(LedgerError::Rejected {
                status: 404,
                message: format!("unknown settlement {}", challenge.settlement_id),
            });
        };
        if !self.challenges.contains_key(&challenge.id) {
            self.challenges.insert(challenge.id, challenge.clone());
            entry.challenge_ids.push(challenge.id);
        }
        Ok(())
    }

    async fn get_challenge_status(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeStatus>, LedgerError> {
        self.enter(LedgerOp::GetChallengeStatus)?;
        Ok(self.challenges.get(&challenge_id).map(|c| c.status))
    }

    fn endpoint_id(&self) -> &str {
        "memory"
    }
}
