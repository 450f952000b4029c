use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::negotiation::{ContradictionAnalysis, Severity};
use crate::types::{ChallengeId, SettlementId};

/// Resolution status of a challenge.
///
/// Only `Pending → Upheld` and `Pending → Rejected` are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Upheld,
    Rejected,
}

impl ChallengeStatus {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Upheld => write!(f, "upheld"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// A claim that a settlement violates an explicit constraint of one of its
/// source intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    /// Back-reference to the challenged settlement (lookup, not ownership).
    pub settlement_id: SettlementId,
    pub challenger_id: String,
    pub contradiction_proof: String,
    pub paraphrase_evidence: String,
    #[serde(default)]
    pub violated_constraints: Vec<String>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub status: ChallengeStatus,
}

impl Challenge {
    /// Build a pending challenge from a contradiction analysis.
    pub fn from_analysis(
        settlement_id: SettlementId,
        challenger_id: impl Into<String>,
        analysis: &ContradictionAnalysis,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let contradiction_proof = format!(
            "violated constraints: {} (confidence {:.2}, severity {})",
            analysis.violated_constraints.join("; "),
            analysis.confidence,
            analysis.severity
        );
        Self {
            id: ChallengeId::new(),
            settlement_id,
            challenger_id: challenger_id.into(),
            contradiction_proof,
            paraphrase_evidence: analysis.explanation.clone(),
            violated_constraints: analysis.violated_constraints.clone(),
            severity: analysis.severity,
            timestamp,
            status: ChallengeStatus::Pending,
        }
    }

    /// Resolve a pending challenge. Resolving to the same terminal status is a
    /// no-op; any other change of a resolved challenge is an error.
    pub fn resolve(&mut self, status: ChallengeStatus) -> Result<bool, CoreError> {
        match (self.status, status) {
            (_, ChallengeStatus::Pending) => Ok(false),
            (ChallengeStatus::Pending, resolved) => {
                self.status = resolved;
                Ok(true)
            }
            (current, requested) if current == requested => Ok(false),
            (current, _) => Err(CoreError::ChallengeAlreadyResolved(current.to_string())),
        }
    }
}
