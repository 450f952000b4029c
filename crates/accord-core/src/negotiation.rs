//! Structured inputs from the external negotiation and contradiction-analysis
//! collaborators.
//!
//! Both are consumed as already-structured records. Nothing here parses raw
//! model output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the negotiation collaborator for a candidate intent pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResult {
    /// Whether the two intents were judged compatible.
    pub success: bool,
    /// Free-text reasoning, passed through untouched.
    #[serde(default)]
    pub reasoning: String,
    /// Proposed terms, an opaque structured blob.
    #[serde(default)]
    pub proposed_terms: serde_json::Value,
    /// Collaborator confidence in `[0.0, 1.0]`.
    #[serde(default)]
    pub confidence_score: f64,
}

/// Severity attached to a contradiction finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minor => write!(f, "minor"),
            Self::Moderate => write!(f, "moderate"),
            Self::Severe => write!(f, "severe"),
        }
    }
}

/// Which side of the settlement a contradiction harms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectedParty {
    PartyA,
    PartyB,
    Both,
}

/// Output of the contradiction-analysis collaborator for one settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContradictionAnalysis {
    pub has_contradiction: bool,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Explicit intent constraints the settlement violates.
    #[serde(default)]
    pub violated_constraints: Vec<String>,
    pub severity: Severity,
    pub affected_party: AffectedParty,
    /// Supporting explanation, used as paraphrase evidence.
    #[serde(default)]
    pub explanation: String,
}
