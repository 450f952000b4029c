use crate::state_machine::SettlementStatus;

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} on {event}")]
    InvalidStateTransition {
        from: SettlementStatus,
        event: String,
    },

    #[error("challenge already resolved as {0}")]
    ChallengeAlreadyResolved(String),

    #[error("validation failed: {0}")]
    ValidationError(String),

    #[error("invalid intent hash: {0}")]
    InvalidIntentHash(String),
}
