//! Challenge subsystem: decide whether an analysis warrants a challenge, file
//! it on the ledger, and watch it until the ledger resolves it.

pub mod detector;
pub mod manager;

pub use detector::ChallengeDetector;
pub use manager::{ChallengeManager, ChallengeResolution, ChallengeStats};
