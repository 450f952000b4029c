use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Challenge outcomes attributed to one challenger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Challenges this challenger filed that the ledger rejected.
    pub failed_challenges: u64,
    /// Challenges this challenger filed that the ledger upheld.
    pub upheld_challenges: u64,
}

impl ReputationRecord {
    /// Fraction of resolved challenges that failed, in `[0.0, 1.0]`.
    ///
    /// A challenger with no resolved challenges carries no penalty.
    pub fn penalty_score(&self) -> f64 {
        let resolved = self.failed_challenges + self.upheld_challenges;
        if resolved == 0 {
            return 0.0;
        }
        (self.failed_challenges as f64 / resolved as f64).clamp(0.0, 1.0)
    }
}

/// Concurrent reputation ledger keyed by challenger id.
#[derive(Debug, Default)]
pub struct ReputationTracker {
    records: DashMap<String, ReputationRecord>,
}

impl ReputationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a rejected challenge against its challenger.
    pub fn record_failed_challenge(&self, challenger_id: &str) {
        let mut record = self.records.entry(challenger_id.to_string()).or_default();
        record.failed_challenges += 1;
        tracing::info!(
            challenger_id,
            failed_challenges = record.failed_challenges,
            "failed challenge recorded"
        );
    }

    pub fn record_upheld_challenge(&self, challenger_id: &str) {
        let mut record = self.records.entry(challenger_id.to_string()).or_default();
        record.upheld_challenges += 1;
    }

    /// The record for a challenger; zeroed if nothing was recorded yet.
    pub fn get(&self, challenger_id: &str) -> ReputationRecord {
        self.records
            .get(challenger_id)
            .map(|r| *r)
            .unwrap_or_default()
    }

    pub fn failed_challenges(&self, challenger_id: &str) -> u64 {
        self.get(challenger_id).failed_challenges
    }
}
