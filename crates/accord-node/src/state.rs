//! Shared node state for the scheduler and HTTP handlers.

use std::sync::Arc;
use std::time::Instant;

use accord_core::Clock;
use accord_gateway::{ILedgerGateway, RetryingGateway};
use accord_settlement::{ChallengeDetector, ChallengeManager, ReputationTracker, SettlementLifecycle};

use crate::config::AccordConfig;

/// Shared state for the running node, accessible from HTTP handlers.
pub struct NodeState {
    pub node_name: String,
    /// Identity used on challenges filed by this node.
    pub mediator_id: String,
    /// When the node started.
    pub start_time: Instant,
    pub gateway: Arc<RetryingGateway>,
    pub lifecycle: Arc<SettlementLifecycle>,
    pub challenges: Arc<ChallengeManager>,
    pub reputation: Arc<ReputationTracker>,
    pub detector: ChallengeDetector,
    pub challenges_enabled: bool,
}

impl NodeState {
    /// Wire the gateway, lifecycle and challenge subsystem over `ledger`.
    pub fn build(config: &AccordConfig, ledger: Arc<dyn ILedgerGateway>, clock: Arc<dyn Clock>) -> Self {
        let gateway = Arc::new(RetryingGateway::with_clock(
            ledger,
            config.gateway.retry_policy(),
            config.gateway.breaker_config(),
            clock.clone(),
        ));
        let lifecycle = Arc::new(SettlementLifecycle::with_clock(
            gateway.clone(),
            None,
            config.settlement.clone(),
            clock.clone(),
        ));
        let reputation = Arc::new(ReputationTracker::new());
        let check_interval_secs = config.challenge.check_interval_secs.min(u64::from(u32::MAX));
        let challenges = Arc::new(ChallengeManager::with_clock(
            gateway.clone(),
            reputation.clone(),
            config.node.mediator_id.clone(),
            chrono::Duration::seconds(check_interval_secs as i64),
            clock,
        ));

        Self {
            node_name: config.node.name.clone(),
            mediator_id: config.node.mediator_id.clone(),
            start_time: Instant::now(),
            gateway,
            lifecycle,
            challenges,
            reputation,
            detector: ChallengeDetector::new(config.challenge.min_confidence),
            challenges_enabled: config.challenge.enabled,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
