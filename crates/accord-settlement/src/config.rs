use serde::{Deserialize, Serialize};

/// Settlement lifecycle settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Percentage of the combined offered fees earned on closure.
    #[serde(default = "default_fee_percent")]
    pub facilitation_fee_percent: f64,
    /// Time both parties have to accept, from creation.
    #[serde(default = "default_acceptance_window_secs")]
    pub acceptance_window_secs: u64,
    /// Combined offered fees at or above which semantic verification gates
    /// closure. Only applies when a verification oracle is configured.
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f64,
    /// Interval between settlement monitoring passes.
    #[serde(default = "default_settlement_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

/// Challenge subsystem settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Whether this node files challenges at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Minimum analysis confidence required to file a challenge.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// Minimum time between two status polls of the same challenge.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Interval between challenge monitoring passes.
    #[serde(default = "default_challenge_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
}

fn default_fee_percent() -> f64 {
    1.0
}
fn default_acceptance_window_secs() -> u64 {
    72 * 60 * 60
}
fn default_verification_threshold() -> f64 {
    1_000.0
}
fn default_settlement_monitor_interval_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}
fn default_min_confidence() -> f64 {
    0.8
}
fn default_check_interval_secs() -> u64 {
    60
}
fn default_challenge_monitor_interval_secs() -> u64 {
    15
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            facilitation_fee_percent: default_fee_percent(),
            acceptance_window_secs: default_acceptance_window_secs(),
            verification_threshold: default_verification_threshold(),
            monitor_interval_secs: default_settlement_monitor_interval_secs(),
        }
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: default_min_confidence(),
            check_interval_secs: default_check_interval_secs(),
            monitor_interval_secs: default_challenge_monitor_interval_secs(),
        }
    }
}
