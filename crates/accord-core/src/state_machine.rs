use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The three states of a settlement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Settlement has been proposed and awaits acceptance by both parties.
    Proposed,
    /// Payout was submitted and the facilitation fee earned. Final state.
    Closed,
    /// Settlement was rejected (deadline, challenge, verification). Final state.
    Rejected,
}

impl SettlementStatus {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Rejected)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "Proposed"),
            Self::Closed => write!(f, "Closed"),
            Self::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Why a settlement ended up rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The acceptance deadline passed without both parties accepting.
    DeadlineExpired,
    /// At least one challenge against the settlement was upheld.
    ChallengeUpheld,
    /// Required semantic verification failed to reach consensus.
    VerificationFailed,
    /// The remote ledger reports the settlement as rejected.
    RejectedByLedger,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadlineExpired => write!(f, "acceptance deadline expired"),
            Self::ChallengeUpheld => write!(f, "challenge upheld"),
            Self::VerificationFailed => write!(f, "verification failed"),
            Self::RejectedByLedger => write!(f, "rejected by ledger"),
        }
    }
}

/// Events that drive settlement state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementEvent {
    /// The settlement was accepted by the ledger for monitoring.
    Submitted,
    /// Payout succeeded after every closure gate passed.
    ClosureCompleted,
    /// The settlement was rejected for the given reason.
    Rejected(RejectionReason),
}

impl fmt::Display for SettlementEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => write!(f, "Submitted"),
            Self::ClosureCompleted => write!(f, "ClosureCompleted"),
            Self::Rejected(reason) => write!(f, "Rejected({})", reason),
        }
    }
}

/// Settlement state transitions.
///
/// Valid transitions:
/// - Proposed → Proposed (Submitted)
/// - Proposed → Closed (ClosureCompleted)
/// - Proposed → Rejected (Rejected, any reason)
///
/// Closed and Rejected are terminal; nothing leads back into Proposed.
pub struct SettlementStateMachine;

impl SettlementStateMachine {
    /// Attempt a state transition based on an event.
    pub fn transition(
        current: SettlementStatus,
        event: SettlementEvent,
    ) -> Result<SettlementStatus, CoreError> {
        let new_state = match (current, event) {
            (SettlementStatus::Proposed, SettlementEvent::Submitted) => SettlementStatus::Proposed,
            (SettlementStatus::Proposed, SettlementEvent::ClosureCompleted) => {
                SettlementStatus::Closed
            }
            (SettlementStatus::Proposed, SettlementEvent::Rejected(_)) => {
                SettlementStatus::Rejected
            }
            _ => {
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    event: event.to_string(),
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = %event,
            "settlement state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: SettlementStatus, event: SettlementEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
