//! Accord Settlement Layer
//!
//! Owns settlement records from proposal to a terminal status: submission to
//! the ledger, periodic status polling, the closure gates (challenges,
//! verification, dual acceptance), and payout. The challenge subsystem files
//! challenges against settlements and tracks their resolution.

pub mod error;
pub mod config;
pub mod gate;
pub mod verification;
pub mod reputation;
pub mod challenge;
pub mod lifecycle;

pub use error::SettlementError;
pub use config::{ChallengeConfig, LifecycleConfig};
pub use gate::{ClosureDecision, DeadlineCheck, DeferReason};
pub use verification::{IVerificationOracle, InMemoryVerificationOracle};
pub use reputation::{ReputationRecord, ReputationTracker};
pub use challenge::{ChallengeDetector, ChallengeManager, ChallengeResolution, ChallengeStats};
pub use lifecycle::{MonitorReport, SettlementLifecycle, ClosureOutcome};
