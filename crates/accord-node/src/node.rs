//! The mediator node orchestrator.
//!
//! Builds the ledger gateway, settlement lifecycle and challenge subsystem
//! from configuration, serves the HTTP API in a background task, and drives
//! the two monitoring loops.

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use accord_core::{Clock, SystemClock};
use accord_gateway::{HttpLedger, ILedgerGateway, InMemoryLedger};
use accord_settlement::{ChallengeResolution, MonitorReport};

use crate::config::AccordConfig;
use crate::state::NodeState;

pub struct MediatorNode {
    config: AccordConfig,
    state: Arc<NodeState>,
    api_task: Option<JoinHandle<()>>,
}

impl MediatorNode {
    /// Create a node talking to the configured ledger, or to an in-process
    /// ledger when no endpoint is set.
    pub fn new(config: AccordConfig) -> Result<Self> {
        let ledger: Arc<dyn ILedgerGateway> = match &config.ledger.endpoint {
            Some(endpoint) => {
                tracing::info!(%endpoint, "using HTTP ledger");
                Arc::new(HttpLedger::new(endpoint.clone(), config.ledger.request_timeout())?)
            }
            None => {
                tracing::warn!("no ledger endpoint configured, using in-memory ledger");
                Arc::new(InMemoryLedger::new())
            }
        };
        Ok(Self::with_ledger(config, ledger, Arc::new(SystemClock)))
    }

    pub fn with_ledger(config: AccordConfig, ledger: Arc<dyn ILedgerGateway>, clock: Arc<dyn Clock>) -> Self {
        let state = Arc::new(NodeState::build(&config, ledger, clock));
        tracing::info!(
            node = %state.node_name,
            mediator_id = %state.mediator_id,
            challenges_enabled = state.challenges_enabled,
            "mediator node created"
        );
        Self {
            config,
            state,
            api_task: None,
        }
    }

    pub fn state(&self) -> Arc<NodeState> {
        self.state.clone()
    }

    /// Start the HTTP API server in a background task.
    pub async fn start(&mut self) -> Result<()> {
        let api_addr: SocketAddr = self.config.api_addr().parse()?;
        let listener = tokio::net::TcpListener::bind(api_addr).await?;
        let api_state = self.state.clone();
        self.api_task = Some(tokio::spawn(async move {
            if let Err(e) = crate::api::serve(listener, api_state).await {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }));
        Ok(())
    }

    /// Run the settlement and challenge monitoring loops until cancelled.
    ///
    /// Each loop runs one pass to completion before waiting for its next
    /// tick; ticks missed during a slow pass are skipped, not queued.
    pub async fn run(&self) -> Result<()> {
        let settlement_every = Duration::from_secs(self.config.settlement.monitor_interval_secs.max(1));
        let challenge_every = Duration::from_secs(self.config.challenge.monitor_interval_secs.max(1));

        let settlements = async {
            let mut ticker = tokio::time::interval(settlement_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_settlement_pass().await;
            }
        };

        let challenges = async {
            if !self.state.challenges_enabled {
                return std::future::pending::<()>().await;
            }
            let mut ticker = tokio::time::interval(challenge_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_challenge_pass().await;
            }
        };

        tracing::info!(
            settlement_interval = ?settlement_every,
            challenge_interval = ?challenge_every,
            "monitoring loops started"
        );
        tokio::join!(settlements, challenges);
        Ok(())
    }

    pub async fn run_settlement_pass(&self) -> MonitorReport {
        self.state.lifecycle.monitor_settlements().await
    }

    /// Poll tracked challenges and record every observed resolution on its
    /// settlement.
    pub async fn run_challenge_pass(&self) -> Vec<ChallengeResolution> {
        let resolutions = self.state.challenges.monitor_challenges().await;
        for resolution in &resolutions {
            if let Err(e) = self.state.lifecycle.apply_challenge_resolution(
                resolution.settlement_id,
                resolution.challenge_id,
                resolution.status,
            ) {
                tracing::warn!(
                    settlement_id = %resolution.settlement_id,
                    challenge_id = %resolution.challenge_id,
                    error = %e,
                    "could not apply challenge resolution"
                );
            }
        }
        resolutions
    }

    /// Stop the API server and log final counters.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(task) = self.api_task.take() {
            task.abort();
        }
        let stats = self.state.challenges.get_challenge_stats();
        tracing::info!(
            active_settlements = self.state.lifecycle.active_count(),
            tracked_challenges = stats.pending,
            circuit = %self.state.gateway.breaker().state(),
            "mediator node stopped"
        );
        Ok(())
    }
}
