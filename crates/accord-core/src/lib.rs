//! Accord core types.
//!
//! Domain records shared by the gateway and settlement layers: settlement and
//! challenge records, the structured inputs produced by the external
//! negotiation and contradiction-analysis collaborators, and the settlement
//! state machine.

pub mod error;
pub mod types;
pub mod negotiation;
pub mod challenge;
pub mod settlement;
pub mod state_machine;
pub mod clock;

pub use error::CoreError;
pub use types::{ChallengeId, Intent, IntentHash, SettlementId};
pub use negotiation::{AffectedParty, ContradictionAnalysis, NegotiationResult, Severity};
pub use challenge::{Challenge, ChallengeStatus};
pub use settlement::{RemoteSettlementStatus, Settlement, VerificationStatus};
pub use state_machine::{RejectionReason, SettlementEvent, SettlementStateMachine, SettlementStatus};
pub use clock::{Clock, ManualClock, SystemClock};
