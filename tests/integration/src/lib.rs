//! Shared fixtures for the cross-crate tests.
//!
//! A [`Harness`] wires an in-memory ledger, a manual clock, the retrying
//! gateway, the settlement lifecycle and the challenge manager together the
//! same way the node does, with retry delays shortened to a millisecond.

use std::sync::Arc;
use std::time::Duration;

use accord_core::{
    AffectedParty, Clock, ContradictionAnalysis, Intent, IntentHash, ManualClock,
    NegotiationResult, Settlement, SettlementId, Severity,
};
use accord_gateway::{BreakerConfig, InMemoryLedger, RetryPolicy, RetryingGateway};
use accord_settlement::{
    ChallengeManager, IVerificationOracle, LifecycleConfig, ReputationTracker, SettlementLifecycle,
};

pub const MEDIATOR_ID: &str = "mediator-it";

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub clock: Arc<ManualClock>,
    pub gateway: Arc<RetryingGateway>,
    pub lifecycle: Arc<SettlementLifecycle>,
    pub challenges: Arc<ChallengeManager>,
    pub reputation: Arc<ReputationTracker>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(LifecycleConfig::default(), None)
    }

    pub fn with(config: LifecycleConfig, verifier: Option<Arc<dyn IVerificationOracle>>) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::default());
        let gateway = Arc::new(RetryingGateway::with_clock(
            ledger.clone(),
            RetryPolicy::new(3, Duration::from_millis(1)),
            BreakerConfig::default(),
            clock.clone(),
        ));
        let lifecycle = Arc::new(SettlementLifecycle::with_clock(
            gateway.clone(),
            verifier,
            config,
            clock.clone(),
        ));
        let reputation = Arc::new(ReputationTracker::new());
        let challenges = Arc::new(ChallengeManager::with_clock(
            gateway.clone(),
            reputation.clone(),
            MEDIATOR_ID,
            chrono::Duration::seconds(60),
            clock.clone(),
        ));
        Self {
            ledger,
            clock,
            gateway,
            lifecycle,
            challenges,
            reputation,
        }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Create and submit a settlement between two fresh intents.
    pub async fn propose(&self, fee_a: f64, fee_b: f64) -> Settlement {
        let (a, b) = intent_pair(fee_a, fee_b);
        let settlement = self
            .lifecycle
            .create_settlement(&a, &b, &negotiation())
            .expect("create settlement");
        self.lifecycle
            .submit_settlement(settlement.id)
            .await
            .expect("submit settlement");
        settlement
    }

    pub fn status(&self, id: SettlementId) -> accord_core::SettlementStatus {
        self.lifecycle
            .get_settlement(id)
            .expect("settlement on record")
            .status
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Two intents with distinct content.
pub fn intent_pair(fee_a: f64, fee_b: f64) -> (Intent, Intent) {
    let tag = SettlementId::new().to_string();
    (
        Intent::new(IntentHash::from_content(format!("offer {tag}").as_bytes()), "alice", fee_a),
        Intent::new(IntentHash::from_content(format!("request {tag}").as_bytes()), "bob", fee_b),
    )
}

pub fn negotiation() -> NegotiationResult {
    NegotiationResult {
        success: true,
        reasoning: "price and delivery window overlap".into(),
        proposed_terms: serde_json::json!({ "price": 250, "delivery": "2026-11-02" }),
        confidence_score: 0.87,
    }
}

pub fn contradiction(confidence: f64) -> ContradictionAnalysis {
    ContradictionAnalysis {
        has_contradiction: true,
        confidence,
        violated_constraints: vec!["delivery before november".into()],
        severity: Severity::Moderate,
        affected_party: AffectedParty::PartyB,
        explanation: "terms deliver on november 2nd".into(),
    }
}
