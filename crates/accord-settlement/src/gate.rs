//! Closure and deadline decisions.
//!
//! Pure functions over a settlement snapshot; the lifecycle performs whatever
//! remote calls the decision calls for.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use accord_core::{RejectionReason, Settlement, VerificationStatus};

/// Where a settlement stands relative to its acceptance deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineCheck {
    /// The deadline has not passed.
    Open,
    /// The deadline passed and at least one party never accepted.
    ExpiredUnaccepted,
    /// The deadline passed but both parties accepted in time; closure is
    /// still attempted.
    ExpiredAccepted,
}

/// Why a closure attempt was postponed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    /// At least one party has not accepted yet.
    AwaitingAcceptance,
    /// Verification is required but no outcome is on record.
    VerificationMissing,
    /// Verification is still running.
    VerificationOutstanding,
    /// The ledger does not know the settlement (yet).
    NotOnLedger,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingAcceptance => write!(f, "awaiting acceptance"),
            Self::VerificationMissing => write!(f, "verification record missing"),
            Self::VerificationOutstanding => write!(f, "verification outstanding"),
            Self::NotOnLedger => write!(f, "not found on ledger"),
        }
    }
}

/// What a closure attempt should do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClosureDecision {
    Reject(RejectionReason),
    Defer(DeferReason),
    /// Every gate passed; pay out the facilitation fee.
    Payout { amount: f64 },
}

pub fn check_deadline(settlement: &Settlement, now: DateTime<Utc>) -> DeadlineCheck {
    if !settlement.deadline_passed(now) {
        DeadlineCheck::Open
    } else if settlement.both_accepted() {
        DeadlineCheck::ExpiredAccepted
    } else {
        DeadlineCheck::ExpiredUnaccepted
    }
}

/// Run the closure gates in order:
///
/// 1. any upheld challenge rejects the settlement;
/// 2. both parties must have accepted;
/// 3. when verification is required, a failed consensus rejects, an
///    outstanding or missing outcome defers, and only a reached consensus
///    lets closure continue;
/// 4. otherwise the facilitation fee is paid out.
///
/// `verification` is the freshest known outcome, `None` when verification is
/// required but nothing is on record. It is ignored for settlements that do
/// not require verification.
pub fn evaluate_closure(
    settlement: &Settlement,
    verification: Option<VerificationStatus>,
) -> ClosureDecision {
    if settlement.has_upheld_challenge() {
        return ClosureDecision::Reject(RejectionReason::ChallengeUpheld);
    }
    if !settlement.both_accepted() {
        return ClosureDecision::Defer(DeferReason::AwaitingAcceptance);
    }
    if settlement.requires_verification() {
        match verification {
            Some(VerificationStatus::ConsensusReached) => {}
            Some(VerificationStatus::ConsensusFailed) => {
                return ClosureDecision::Reject(RejectionReason::VerificationFailed);
            }
            Some(VerificationStatus::Pending) | Some(VerificationStatus::InProgress) => {
                return ClosureDecision::Defer(DeferReason::VerificationOutstanding);
            }
            Some(VerificationStatus::NotRequired) | None => {
                return ClosureDecision::Defer(DeferReason::VerificationMissing);
            }
        }
    }
    ClosureDecision::Payout {
        amount: settlement.facilitation_fee,
    }
}
