use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::challenge::{Challenge, ChallengeStatus};
use crate::error::CoreError;
use crate::negotiation::NegotiationResult;
use crate::state_machine::{
    RejectionReason, SettlementEvent, SettlementStateMachine, SettlementStatus,
};
use crate::types::{ChallengeId, Intent, IntentHash, SettlementId};

/// Outcome of the external semantic-verification process for a settlement.
///
/// `NotRequired` is fixed at creation for settlements that need no
/// verification; every other variant means verification gates closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    NotRequired,
    Pending,
    InProgress,
    ConsensusReached,
    ConsensusFailed,
}

impl VerificationStatus {
    /// Whether closure must wait on this status.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRequired => write!(f, "not_required"),
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::ConsensusReached => write!(f, "consensus_reached"),
            Self::ConsensusFailed => write!(f, "consensus_failed"),
        }
    }
}

/// Settlement state as reported by the remote ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettlementStatus {
    pub party_a_accepted: bool,
    pub party_b_accepted: bool,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    pub status: SettlementStatus,
}

/// A proposed pairing of two intents with economic terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub intent_a: IntentHash,
    pub intent_b: IntentHash,
    pub party_a: String,
    pub party_b: String,
    /// Opaque terms from the negotiation collaborator.
    pub proposed_terms: serde_json::Value,
    pub reasoning: String,
    pub confidence_score: f64,
    pub facilitation_fee_percent: f64,
    /// Derived once at creation; never recomputed.
    pub facilitation_fee: f64,
    pub status: SettlementStatus,
    pub rejection: Option<RejectionReason>,
    pub created_at: DateTime<Utc>,
    pub acceptance_deadline: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub party_a_accepted: bool,
    pub party_b_accepted: bool,
    /// Append-only.
    pub challenges: Vec<Challenge>,
    pub verification: VerificationStatus,
}

/// Facilitation fee for a pair of offered fees at `percent` percent.
pub fn facilitation_fee(fee_a: f64, fee_b: f64, percent: f64) -> f64 {
    (fee_a + fee_b) * percent / 100.0
}

impl Settlement {
    /// Build a new `Proposed` settlement from an accepted negotiation outcome.
    pub fn propose(
        intent_a: &Intent,
        intent_b: &Intent,
        negotiation: &NegotiationResult,
        fee_percent: f64,
        acceptance_deadline: DateTime<Utc>,
        requires_verification: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        if !negotiation.success {
            return Err(CoreError::ValidationError(
                "negotiation did not succeed".into(),
            ));
        }
        if intent_a.hash == intent_b.hash {
            return Err(CoreError::ValidationError(
                "a settlement needs two distinct intents".into(),
            ));
        }
        for fee in [intent_a.offered_fee, intent_b.offered_fee] {
            if !fee.is_finite() || fee < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "offered fee must be a non-negative number, got {fee}"
                )));
            }
        }
        if !fee_percent.is_finite() || !(0.0..=100.0).contains(&fee_percent) {
            return Err(CoreError::ValidationError(format!(
                "facilitation fee percent out of range: {fee_percent}"
            )));
        }
        if acceptance_deadline <= now {
            return Err(CoreError::ValidationError(
                "acceptance deadline must be in the future".into(),
            ));
        }

        Ok(Self {
            id: SettlementId::new(),
            intent_a: intent_a.hash,
            intent_b: intent_b.hash,
            party_a: intent_a.author.clone(),
            party_b: intent_b.author.clone(),
            proposed_terms: negotiation.proposed_terms.clone(),
            reasoning: negotiation.reasoning.clone(),
            confidence_score: negotiation.confidence_score,
            facilitation_fee_percent: fee_percent,
            facilitation_fee: facilitation_fee(
                intent_a.offered_fee,
                intent_b.offered_fee,
                fee_percent,
            ),
            status: SettlementStatus::Proposed,
            rejection: None,
            created_at: now,
            acceptance_deadline,
            closed_at: None,
            rejected_at: None,
            party_a_accepted: false,
            party_b_accepted: false,
            challenges: Vec::new(),
            verification: if requires_verification {
                VerificationStatus::Pending
            } else {
                VerificationStatus::NotRequired
            },
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn both_accepted(&self) -> bool {
        self.party_a_accepted && self.party_b_accepted
    }

    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.acceptance_deadline
    }

    pub fn requires_verification(&self) -> bool {
        self.verification != VerificationStatus::NotRequired
    }

    pub fn has_upheld_challenge(&self) -> bool {
        self.challenges
            .iter()
            .any(|c| c.status == ChallengeStatus::Upheld)
    }

    /// Merge acceptance flags. Flags only ever move from false to true.
    ///
    /// Returns whether anything changed.
    pub fn record_acceptance(&mut self, party_a: bool, party_b: bool) -> bool {
        if self.is_terminal() {
            return false;
        }
        let before = (self.party_a_accepted, self.party_b_accepted);
        self.party_a_accepted |= party_a;
        self.party_b_accepted |= party_b;
        before != (self.party_a_accepted, self.party_b_accepted)
    }

    /// Append a challenge that is not yet known. Returns whether it was added.
    pub fn attach_challenge(&mut self, challenge: Challenge) -> bool {
        if self.is_terminal() || challenge.settlement_id != self.id {
            return false;
        }
        if self.challenges.iter().any(|c| c.id == challenge.id) {
            return false;
        }
        self.challenges.push(challenge);
        true
    }

    /// Resolve a known pending challenge.
    ///
    /// Returns `Ok(false)` when the challenge is unknown, already carries that
    /// status, or the settlement is terminal.
    pub fn resolve_challenge(
        &mut self,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<bool, CoreError> {
        if self.is_terminal() {
            return Ok(false);
        }
        match self.challenges.iter_mut().find(|c| c.id == challenge_id) {
            Some(challenge) => challenge.resolve(status),
            None => Ok(false),
        }
    }

    /// Merge challenges observed on the ledger: unknown ones are appended,
    /// known pending ones pick up their resolution.
    ///
    /// Returns the number of challenges appended or resolved.
    pub fn merge_challenges(&mut self, observed: &[Challenge]) -> usize {
        let mut changed = 0;
        for remote in observed {
            if self.challenges.iter().any(|c| c.id == remote.id) {
                match self.resolve_challenge(remote.id, remote.status) {
                    Ok(true) => changed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            settlement_id = %self.id,
                            challenge_id = %remote.id,
                            error = %e,
                            "ignoring conflicting challenge status from ledger"
                        );
                    }
                }
            } else if self.attach_challenge(remote.clone()) {
                changed += 1;
            }
        }
        changed
    }

    /// Record the latest verification outcome. Has no effect on settlements
    /// that do not require verification or are already terminal.
    pub fn set_verification(&mut self, status: VerificationStatus) -> bool {
        if self.is_terminal()
            || !self.requires_verification()
            || status == VerificationStatus::NotRequired
            || self.verification == status
        {
            return false;
        }
        self.verification = status;
        true
    }

    /// Apply a lifecycle event through the state machine.
    pub fn apply(&mut self, event: SettlementEvent, now: DateTime<Utc>) -> Result<(), CoreError> {
        let next = SettlementStateMachine::transition(self.status, event)?;
        self.status = next;
        match event {
            SettlementEvent::ClosureCompleted => self.closed_at = Some(now),
            SettlementEvent::Rejected(reason) => {
                self.rejection = Some(reason);
                self.rejected_at = Some(now);
            }
            SettlementEvent::Submitted => {}
        }
        Ok(())
    }

    pub fn reject(&mut self, reason: RejectionReason, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(SettlementEvent::Rejected(reason), now)
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.apply(SettlementEvent::ClosureCompleted, now)
    }
}
