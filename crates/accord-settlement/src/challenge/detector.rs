use accord_core::ContradictionAnalysis;

/// Default minimum analysis confidence for filing a challenge.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

/// Turns a contradiction analysis into a yes/no challenge decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChallengeDetector {
    min_confidence: f64,
}

impl ChallengeDetector {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// True iff the analysis found a contradiction, names at least one
    /// violated constraint, and its confidence is a number in `[0, 1]` at or
    /// above the threshold.
    pub fn should_challenge(&self, analysis: &ContradictionAnalysis) -> bool {
        if !analysis.has_contradiction || analysis.violated_constraints.is_empty() {
            return false;
        }
        let confidence = analysis.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            tracing::warn!(confidence, "ignoring analysis with out-of-range confidence");
            return false;
        }
        confidence >= self.min_confidence
    }
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONFIDENCE)
    }
}
