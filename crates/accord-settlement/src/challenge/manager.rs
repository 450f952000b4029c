use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, Clock, ContradictionAnalysis, Settlement,
    SettlementId, SystemClock,
};
use accord_gateway::RetryingGateway;

use crate::error::SettlementError;
use crate::reputation::ReputationTracker;

/// A filed challenge awaiting its ledger-side resolution.
#[derive(Debug, Clone)]
struct TrackedChallenge {
    challenge: Challenge,
    last_checked: DateTime<Utc>,
}

/// A challenge resolution observed on the ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeResolution {
    pub challenge_id: ChallengeId,
    pub settlement_id: SettlementId,
    pub challenger_id: String,
    pub status: ChallengeStatus,
}

/// Counters for the challenge subsystem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChallengeStats {
    pub submitted: u64,
    pub submission_failures: u64,
    /// Challenges currently tracked and awaiting resolution.
    pub pending: u64,
    pub upheld: u64,
    pub rejected: u64,
}

/// Marks a settlement as having a challenge submission in flight; released
/// on drop.
struct SubmissionSlot<'a> {
    set: &'a DashSet<SettlementId>,
    id: SettlementId,
}

impl Drop for SubmissionSlot<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// Files challenges through the ledger gateway and tracks them until the
/// ledger resolves them.
///
/// At most one challenge per settlement is tracked at a time. Removal from
/// the tracking table happens before the resolution handler runs, so each
/// resolution is handled exactly once even with overlapping passes.
pub struct ChallengeManager {
    gateway: Arc<RetryingGateway>,
    reputation: Arc<ReputationTracker>,
    clock: Arc<dyn Clock>,
    challenger_id: String,
    check_interval: Duration,
    tracked: DashMap<SettlementId, TrackedChallenge>,
    /// Settlements with a submission in progress.
    submitting: DashSet<SettlementId>,
    submitted: AtomicU64,
    submission_failures: AtomicU64,
    upheld: AtomicU64,
    rejected: AtomicU64,
}

impl ChallengeManager {
    pub fn new(
        gateway: Arc<RetryingGateway>,
        reputation: Arc<ReputationTracker>,
        challenger_id: impl Into<String>,
        check_interval: Duration,
    ) -> Self {
        Self::with_clock(
            gateway,
            reputation,
            challenger_id,
            check_interval,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        gateway: Arc<RetryingGateway>,
        reputation: Arc<ReputationTracker>,
        challenger_id: impl Into<String>,
        check_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            reputation,
            clock,
            challenger_id: challenger_id.into(),
            check_interval,
            tracked: DashMap::new(),
            submitting: DashSet::new(),
            submitted: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
            upheld: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn challenger_id(&self) -> &str {
        &self.challenger_id
    }

    /// File a challenge against `settlement` built from `analysis`.
    ///
    /// The challenge is tracked only once the ledger has accepted it.
    pub async fn submit_challenge(
        &self,
        settlement: &Settlement,
        analysis: &ContradictionAnalysis,
    ) -> Result<Challenge, SettlementError> {
        if settlement.is_terminal() {
            return Err(SettlementError::Terminal {
                id: settlement.id,
                status: settlement.status,
            });
        }
        // held across the ledger call
        let Some(_slot) = self.reserve(settlement.id) else {
            return Err(SettlementError::ChallengeAlreadyPending(settlement.id));
        };

        let now = self.clock.now();
        let challenge = Challenge::from_analysis(settlement.id, &self.challenger_id, analysis, now);

        if let Err(e) = self.gateway.submit_challenge(&challenge).await {
            self.submission_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                settlement_id = %settlement.id,
                challenge_id = %challenge.id,
                error = %e,
                "challenge submission failed"
            );
            return Err(e.into());
        }

        self.tracked.insert(
            settlement.id,
            TrackedChallenge {
                challenge: challenge.clone(),
                last_checked: now,
            },
        );
        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            settlement_id = %settlement.id,
            challenge_id = %challenge.id,
            severity = %challenge.severity,
            "challenge submitted"
        );
        Ok(challenge)
    }

    /// Poll every tracked challenge whose last check is at least
    /// `check_interval` old, and handle the ones the ledger has resolved.
    pub async fn monitor_challenges(&self) -> Vec<ChallengeResolution> {
        let now = self.clock.now();
        let due: Vec<(SettlementId, ChallengeId)> = self
            .tracked
            .iter()
            .filter(|entry| now - entry.last_checked >= self.check_interval)
            .map(|entry| (*entry.key(), entry.challenge.id))
            .collect();

        let mut resolutions = Vec::new();
        for (settlement_id, challenge_id) in due {
            match self.gateway.get_challenge_status(challenge_id).await {
                Ok(Some(status)) if status.is_resolved() => {
                    let removed = self
                        .tracked
                        .remove_if(&settlement_id, |_, t| t.challenge.id == challenge_id);
                    if let Some((_, tracked)) = removed {
                        resolutions.push(self.handle_resolution(tracked.challenge, status));
                    }
                }
                Ok(Some(_)) => self.touch(settlement_id, challenge_id, now),
                Ok(None) => {
                    tracing::warn!(
                        settlement_id = %settlement_id,
                        challenge_id = %challenge_id,
                        "tracked challenge not found on ledger"
                    );
                    self.touch(settlement_id, challenge_id, now);
                }
                Err(e) if e.is_circuit_open() => {
                    tracing::debug!(challenge_id = %challenge_id, "challenge poll skipped, circuit open");
                    self.touch(settlement_id, challenge_id, now);
                }
                Err(e) => {
                    tracing::warn!(
                        challenge_id = %challenge_id,
                        error = %e,
                        "challenge status poll failed"
                    );
                    self.touch(settlement_id, challenge_id, now);
                }
            }
        }
        resolutions
    }

    /// Claim the submission slot for a settlement. `None` while another
    /// submission is in progress or a challenge is already tracked.
    fn reserve(&self, settlement_id: SettlementId) -> Option<SubmissionSlot<'_>> {
        if !self.submitting.insert(settlement_id) {
            return None;
        }
        let slot = SubmissionSlot {
            set: &self.submitting,
            id: settlement_id,
        };
        if self.tracked.contains_key(&settlement_id) {
            return None;
        }
        Some(slot)
    }

    fn touch(&self, settlement_id: SettlementId, challenge_id: ChallengeId, now: DateTime<Utc>) {
        if let Some(mut tracked) = self.tracked.get_mut(&settlement_id) {
            if tracked.challenge.id == challenge_id {
                tracked.last_checked = now;
            }
        }
    }

    fn handle_resolution(&self, mut challenge: Challenge, status: ChallengeStatus) -> ChallengeResolution {
        if let Err(e) = challenge.resolve(status) {
            tracing::warn!(challenge_id = %challenge.id, error = %e, "inconsistent challenge resolution");
        }
        match status {
            ChallengeStatus::Rejected => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                self.reputation.record_failed_challenge(&challenge.challenger_id);
                tracing::warn!(
                    settlement_id = %challenge.settlement_id,
                    challenge_id = %challenge.id,
                    "challenge rejected by ledger"
                );
            }
            ChallengeStatus::Upheld => {
                self.upheld.fetch_add(1, Ordering::Relaxed);
                self.reputation.record_upheld_challenge(&challenge.challenger_id);
                tracing::info!(
                    settlement_id = %challenge.settlement_id,
                    challenge_id = %challenge.id,
                    "challenge upheld"
                );
            }
            ChallengeStatus::Pending => {}
        }
        ChallengeResolution {
            challenge_id: challenge.id,
            settlement_id: challenge.settlement_id,
            challenger_id: challenge.challenger_id,
            status,
        }
    }

    /// The challenge currently tracked for a settlement, if any.
    pub fn tracked_challenge(&self, settlement_id: SettlementId) -> Option<Challenge> {
        self.tracked
            .get(&settlement_id)
            .map(|t| t.challenge.clone())
    }

    pub fn get_challenge_stats(&self) -> ChallengeStats {
        ChallengeStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            submission_failures: self.submission_failures.load(Ordering::Relaxed),
            pending: self.tracked.len() as u64,
            upheld: self.upheld.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
