use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use serde::Serialize;
use std::sync::Arc;

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, Clock, Intent, NegotiationResult, RejectionReason,
    RemoteSettlementStatus, Settlement, SettlementEvent, SettlementId, SettlementStatus,
    SystemClock, VerificationStatus,
};
use accord_gateway::RetryingGateway;

use crate::config::LifecycleConfig;
use crate::error::SettlementError;
use crate::gate::{self, ClosureDecision, DeadlineCheck, DeferReason};
use crate::verification::IVerificationOracle;

/// Upper bound on the configured acceptance window (100 years).
const MAX_ACCEPTANCE_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Result of one closure attempt or one monitored settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClosureOutcome {
    Closed,
    Rejected(RejectionReason),
    Deferred(DeferReason),
    /// Every gate passed but the payout call failed; the settlement stays
    /// active and closure is retried on a later pass.
    PayoutFailed,
}

/// Summary of one monitoring pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorReport {
    pub checked: usize,
    /// Settlements skipped because another pass was processing them.
    pub skipped: usize,
    pub closed: Vec<SettlementId>,
    pub rejected: Vec<(SettlementId, RejectionReason)>,
    pub deferred: usize,
    pub payout_failures: Vec<SettlementId>,
    pub errors: usize,
}

impl MonitorReport {
    fn record(&mut self, id: SettlementId, outcome: ClosureOutcome) {
        match outcome {
            ClosureOutcome::Closed => self.closed.push(id),
            ClosureOutcome::Rejected(reason) => self.rejected.push((id, reason)),
            ClosureOutcome::Deferred(_) => self.deferred += 1,
            ClosureOutcome::PayoutFailed => self.payout_failures.push(id),
        }
    }
}

/// Marks a settlement id as being processed; released on drop.
struct InFlightGuard<'a> {
    set: &'a DashSet<SettlementId>,
    id: SettlementId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

/// Drives settlements from proposal to `Closed` or `Rejected`.
///
/// Records live in a registry that keeps terminal settlements as history;
/// the active set holds the ids still being monitored. Remote calls are made
/// on cloned snapshots and merged back under a short map guard that
/// re-checks terminal status, so no map guard is ever held across an await.
pub struct SettlementLifecycle {
    gateway: Arc<RetryingGateway>,
    verifier: Option<Arc<dyn IVerificationOracle>>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    settlements: DashMap<SettlementId, Settlement>,
    active: DashSet<SettlementId>,
    in_flight: DashSet<SettlementId>,
}

impl SettlementLifecycle {
    pub fn new(
        gateway: Arc<RetryingGateway>,
        verifier: Option<Arc<dyn IVerificationOracle>>,
        config: LifecycleConfig,
    ) -> Self {
        Self::with_clock(gateway, verifier, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        gateway: Arc<RetryingGateway>,
        verifier: Option<Arc<dyn IVerificationOracle>>,
        config: LifecycleConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            verifier,
            clock,
            config,
            settlements: DashMap::new(),
            active: DashSet::new(),
            in_flight: DashSet::new(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn gateway(&self) -> &RetryingGateway {
        &self.gateway
    }

    // ========================================================================
    // Creation and submission
    // ========================================================================

    /// Build a `Proposed` settlement from a successful negotiation and record
    /// it. The settlement is not monitored until it has been submitted.
    pub fn create_settlement(
        &self,
        intent_a: &Intent,
        intent_b: &Intent,
        negotiation: &NegotiationResult,
    ) -> Result<Settlement, SettlementError> {
        let now = self.clock.now();
        let window = self.config.acceptance_window_secs.min(MAX_ACCEPTANCE_WINDOW_SECS);
        let deadline = now + Duration::seconds(window as i64);
        let requires_verification = self.verifier.is_some()
            && intent_a.offered_fee + intent_b.offered_fee >= self.config.verification_threshold;

        let settlement = Settlement::propose(
            intent_a,
            intent_b,
            negotiation,
            self.config.facilitation_fee_percent,
            deadline,
            requires_verification,
            now,
        )?;
        self.settlements.insert(settlement.id, settlement.clone());

        tracing::info!(
            settlement_id = %settlement.id,
            party_a = %settlement.party_a,
            party_b = %settlement.party_b,
            facilitation_fee = settlement.facilitation_fee,
            verification = %settlement.verification,
            deadline = %settlement.acceptance_deadline,
            "settlement proposed"
        );
        Ok(settlement)
    }

    /// Submit a settlement to the ledger and start monitoring it.
    ///
    /// Safe to call again for the same id; the ledger reconciles on it.
    pub async fn submit_settlement(&self, id: SettlementId) -> Result<(), SettlementError> {
        let snapshot = self.snapshot(id)?;
        if snapshot.is_terminal() {
            return Err(SettlementError::Terminal {
                id,
                status: snapshot.status,
            });
        }

        if let Err(e) = self.gateway.submit_settlement(&snapshot).await {
            tracing::warn!(settlement_id = %id, error = %e, "settlement submission failed");
            return Err(e.into());
        }

        {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(SettlementError::NotFound(id))?;
            if entry.is_terminal() {
                return Err(SettlementError::Terminal {
                    id,
                    status: entry.status,
                });
            }
            entry.apply(SettlementEvent::Submitted, self.clock.now())?;
        }
        self.active.insert(id);
        tracing::info!(settlement_id = %id, "settlement submitted");
        Ok(())
    }

    // ========================================================================
    // Monitoring
    // ========================================================================

    /// One pass over a snapshot of the active set.
    ///
    /// Failures for one settlement are logged and counted; the pass always
    /// visits every settlement in the snapshot.
    pub async fn monitor_settlements(&self) -> MonitorReport {
        let now = self.clock.now();
        let ids: Vec<SettlementId> = self.active.iter().map(|id| *id).collect();
        let mut report = MonitorReport::default();

        for id in ids {
            let Some(_guard) = self.claim(id) else {
                report.skipped += 1;
                continue;
            };
            report.checked += 1;
            match self.monitor_one(id, now).await {
                Ok(Some(outcome)) => report.record(id, outcome),
                Ok(None) => {}
                Err(e) if e.is_circuit_open() => {
                    report.errors += 1;
                    tracing::debug!(settlement_id = %id, "settlement check skipped, circuit open");
                }
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(settlement_id = %id, error = %e, "settlement check failed");
                }
            }
        }

        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                closed = report.closed.len(),
                rejected = report.rejected.len(),
                deferred = report.deferred,
                payout_failures = report.payout_failures.len(),
                errors = report.errors,
                "settlement monitoring pass complete"
            );
        }
        report
    }

    /// Returns `None` when the settlement turned out to be terminal already.
    async fn monitor_one(
        &self,
        id: SettlementId,
        now: DateTime<Utc>,
    ) -> Result<Option<ClosureOutcome>, SettlementError> {
        let snapshot = self.snapshot(id)?;
        if snapshot.is_terminal() {
            self.active.remove(&id);
            return Ok(None);
        }

        // Past the deadline with both acceptances on record, the ledger is
        // still polled so that challenges upheld meanwhile veto the payout.
        if gate::check_deadline(&snapshot, now) == DeadlineCheck::ExpiredUnaccepted {
            self.finish_rejected(id, RejectionReason::DeadlineExpired)?;
            return Ok(Some(ClosureOutcome::Rejected(RejectionReason::DeadlineExpired)));
        }

        let Some(remote) = self.gateway.get_settlement_status(id).await? else {
            tracing::warn!(settlement_id = %id, "settlement not found on ledger");
            return Ok(Some(ClosureOutcome::Deferred(DeferReason::NotOnLedger)));
        };

        let merged = self.merge_remote(id, &remote)?;
        if merged.is_terminal() {
            self.active.remove(&id);
            return Ok(None);
        }
        if remote.status == SettlementStatus::Rejected {
            self.finish_rejected(id, RejectionReason::RejectedByLedger)?;
            return Ok(Some(ClosureOutcome::Rejected(RejectionReason::RejectedByLedger)));
        }
        if merged.has_upheld_challenge() {
            self.finish_rejected(id, RejectionReason::ChallengeUpheld)?;
            return Ok(Some(ClosureOutcome::Rejected(RejectionReason::ChallengeUpheld)));
        }
        if merged.both_accepted() {
            return self.attempt_closure(id).await.map(Some);
        }
        Ok(Some(ClosureOutcome::Deferred(DeferReason::AwaitingAcceptance)))
    }

    fn merge_remote(
        &self,
        id: SettlementId,
        remote: &RemoteSettlementStatus,
    ) -> Result<Settlement, SettlementError> {
        let mut entry = self
            .settlements
            .get_mut(&id)
            .ok_or(SettlementError::NotFound(id))?;
        if entry.record_acceptance(remote.party_a_accepted, remote.party_b_accepted) {
            tracing::info!(
                settlement_id = %id,
                party_a_accepted = entry.party_a_accepted,
                party_b_accepted = entry.party_b_accepted,
                "acceptance updated"
            );
        }
        let changed = entry.merge_challenges(&remote.challenges);
        if changed > 0 {
            tracing::debug!(settlement_id = %id, changed, "challenges merged from ledger");
        }
        Ok(entry.clone())
    }

    // ========================================================================
    // Closure
    // ========================================================================

    /// Evaluate the closure gates and pay out if they all pass.
    ///
    /// This is the only path that submits a payout.
    pub async fn close_settlement(&self, id: SettlementId) -> Result<ClosureOutcome, SettlementError> {
        let _guard = self.claim(id).ok_or(SettlementError::InFlight(id))?;
        self.attempt_closure(id).await
    }

    async fn attempt_closure(&self, id: SettlementId) -> Result<ClosureOutcome, SettlementError> {
        let snapshot = self.snapshot(id)?;
        if snapshot.is_terminal() {
            return Err(SettlementError::Terminal {
                id,
                status: snapshot.status,
            });
        }

        let verification = if snapshot.requires_verification()
            && !snapshot.has_upheld_challenge()
            && snapshot.both_accepted()
        {
            self.refresh_verification(id).await?
        } else {
            Some(snapshot.verification)
        };

        match gate::evaluate_closure(&snapshot, verification) {
            ClosureDecision::Reject(reason) => {
                self.finish_rejected(id, reason)?;
                Ok(ClosureOutcome::Rejected(reason))
            }
            ClosureDecision::Defer(reason) => {
                tracing::debug!(settlement_id = %id, %reason, "closure deferred");
                Ok(ClosureOutcome::Deferred(reason))
            }
            ClosureDecision::Payout { amount } => match self.gateway.submit_payout(id, amount).await {
                Ok(()) => {
                    self.finish_closed(id)?;
                    Ok(ClosureOutcome::Closed)
                }
                Err(e) => {
                    if e.is_circuit_open() {
                        tracing::warn!(settlement_id = %id, "payout postponed, circuit open");
                    } else {
                        tracing::error!(settlement_id = %id, amount, error = %e, "payout failed");
                    }
                    Ok(ClosureOutcome::PayoutFailed)
                }
            },
        }
    }

    /// Fetch the latest verification outcome and store it on the record.
    /// `None` when no oracle is configured or the oracle has no record.
    async fn refresh_verification(
        &self,
        id: SettlementId,
    ) -> Result<Option<VerificationStatus>, SettlementError> {
        let Some(oracle) = &self.verifier else {
            tracing::warn!(settlement_id = %id, "verification required but no oracle configured");
            return Ok(None);
        };
        let status = oracle.verification_status(id).await?;
        if let Some(status) = status {
            if let Some(mut entry) = self.settlements.get_mut(&id) {
                entry.set_verification(status);
            }
        }
        Ok(status)
    }

    fn finish_rejected(&self, id: SettlementId, reason: RejectionReason) -> Result<(), SettlementError> {
        let fee = {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(SettlementError::NotFound(id))?;
            if entry.is_terminal() {
                return Err(SettlementError::Terminal {
                    id,
                    status: entry.status,
                });
            }
            entry.reject(reason, self.clock.now())?;
            entry.facilitation_fee
        };
        self.active.remove(&id);
        tracing::info!(settlement_id = %id, %reason, forfeited_fee = fee, "settlement rejected");
        Ok(())
    }

    fn finish_closed(&self, id: SettlementId) -> Result<(), SettlementError> {
        let fee = {
            let mut entry = self
                .settlements
                .get_mut(&id)
                .ok_or(SettlementError::NotFound(id))?;
            if entry.is_terminal() {
                return Err(SettlementError::Terminal {
                    id,
                    status: entry.status,
                });
            }
            entry.close(self.clock.now())?;
            entry.facilitation_fee
        };
        self.active.remove(&id);
        tracing::info!(settlement_id = %id, earned_fee = fee, "settlement closed");
        Ok(())
    }

    // ========================================================================
    // Challenge hooks
    // ========================================================================

    /// Append a challenge to its settlement. Returns whether it was added.
    pub fn attach_challenge(&self, challenge: Challenge) -> Result<bool, SettlementError> {
        let id = challenge.settlement_id;
        let mut entry = self
            .settlements
            .get_mut(&id)
            .ok_or(SettlementError::NotFound(id))?;
        Ok(entry.attach_challenge(challenge))
    }

    /// Record a ledger-side resolution of a challenge on its settlement.
    ///
    /// An upheld challenge takes effect on the next monitoring pass.
    pub fn apply_challenge_resolution(
        &self,
        settlement_id: SettlementId,
        challenge_id: ChallengeId,
        status: ChallengeStatus,
    ) -> Result<bool, SettlementError> {
        let mut entry = self
            .settlements
            .get_mut(&settlement_id)
            .ok_or(SettlementError::NotFound(settlement_id))?;
        Ok(entry.resolve_challenge(challenge_id, status)?)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of the monitored settlements, oldest first.
    pub fn get_active_settlements(&self) -> Vec<Settlement> {
        let mut active: Vec<Settlement> = self
            .active
            .iter()
            .filter_map(|id| self.settlements.get(&*id).map(|s| s.clone()))
            .collect();
        active.sort_by_key(|s| s.created_at);
        active
    }

    pub fn get_settlement(&self, id: SettlementId) -> Option<Settlement> {
        self.settlements.get(&id).map(|s| s.clone())
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, id: SettlementId) -> bool {
        self.active.contains(&id)
    }

    pub fn settlement_count(&self) -> usize {
        self.settlements.len()
    }

    fn snapshot(&self, id: SettlementId) -> Result<Settlement, SettlementError> {
        self.get_settlement(id).ok_or(SettlementError::NotFound(id))
    }

    fn claim(&self, id: SettlementId) -> Option<InFlightGuard<'_>> {
        self.in_flight.insert(id).then(|| InFlightGuard {
            set: &self.in_flight,
            id,
        })
    }
}
