//! End-to-end settlement lifecycle over the in-memory ledger.
//!
//! Covers the happy path from proposal to payout, deadline expiry, the
//! verification gate, ledger-side rejection and concurrent monitoring passes.

use std::sync::Arc;

use accord_core::{RejectionReason, SettlementStatus, VerificationStatus};
use accord_gateway::LedgerOp;
use accord_integration_tests::{Harness, intent_pair, negotiation};
use accord_settlement::{
    ClosureOutcome, DeferReason, IVerificationOracle, InMemoryVerificationOracle, LifecycleConfig,
    SettlementError,
};
use chrono::Duration;

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_proposal_to_payout() {
    let h = Harness::new();
    let settlement = h.propose(10.0, 16.0).await;

    assert!((settlement.facilitation_fee - 0.26).abs() < 1e-9);
    assert!(h.ledger.settlement(settlement.id).is_some());
    assert!(h.lifecycle.is_active(settlement.id));

    // nobody has accepted yet
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.deferred, 1);
    assert!(report.closed.is_empty());

    // one side is not enough
    h.ledger.accept(settlement.id, true, false);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.deferred, 1);
    let recorded = h.lifecycle.get_settlement(settlement.id).unwrap();
    assert!(recorded.party_a_accepted);
    assert!(!recorded.party_b_accepted);

    h.ledger.accept(settlement.id, false, true);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![settlement.id]);

    let closed = h.lifecycle.get_settlement(settlement.id).unwrap();
    assert_eq!(closed.status, SettlementStatus::Closed);
    assert!(closed.closed_at.is_some());
    assert!(!h.lifecycle.is_active(settlement.id));
    assert!((h.ledger.payout_for(settlement.id).unwrap() - 0.26).abs() < 1e-9);

    // closed settlements are history, not monitored
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 0);
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 1);
}

#[tokio::test]
async fn test_manual_close_matches_monitor() {
    let h = Harness::new();
    let settlement = h.propose(50.0, 50.0).await;

    let outcome = h.lifecycle.close_settlement(settlement.id).await.unwrap();
    assert_eq!(outcome, ClosureOutcome::Deferred(DeferReason::AwaitingAcceptance));

    // acceptance only reaches the local record through a monitoring pass
    h.ledger.accept(settlement.id, true, true);
    h.lifecycle.monitor_settlements().await;
    assert_eq!(h.status(settlement.id), SettlementStatus::Closed);

    let err = h.lifecycle.close_settlement(settlement.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::Terminal { .. }));
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 1);
}

#[tokio::test]
async fn test_active_settlements_listed_oldest_first() {
    let h = Harness::new();
    let first = h.propose(1.0, 1.0).await;
    h.clock.advance(Duration::seconds(5));
    let second = h.propose(2.0, 2.0).await;

    let ids: Vec<_> = h.lifecycle.get_active_settlements().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

// ============================================================================
// Deadline
// ============================================================================

#[tokio::test]
async fn test_deadline_expiry_rejects_without_payout() {
    let h = Harness::new();
    let settlement = h.propose(10.0, 10.0).await;
    h.ledger.accept(settlement.id, true, false);

    h.clock.advance(Duration::hours(71));
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.deferred, 1);

    h.clock.advance(Duration::hours(2));
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(
        report.rejected,
        vec![(settlement.id, RejectionReason::DeadlineExpired)]
    );

    let rejected = h.lifecycle.get_settlement(settlement.id).unwrap();
    assert_eq!(rejected.status, SettlementStatus::Rejected);
    assert_eq!(rejected.rejection, Some(RejectionReason::DeadlineExpired));
    assert!(h.ledger.payout_for(settlement.id).is_none());

    // late acceptance changes nothing
    h.ledger.accept(settlement.id, true, true);
    h.lifecycle.monitor_settlements().await;
    assert_eq!(h.status(settlement.id), SettlementStatus::Rejected);
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 0);
}

#[tokio::test]
async fn test_accepted_before_deadline_still_pays_after_it() {
    let h = Harness::new();
    let settlement = h.propose(10.0, 10.0).await;
    h.ledger.accept(settlement.id, true, true);

    // the payout fails while the deadline is still open
    h.ledger.fail_next(LedgerOp::SubmitPayout, 3);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.payout_failures, vec![settlement.id]);
    assert!(h.lifecycle.get_settlement(settlement.id).unwrap().both_accepted());

    h.clock.advance(Duration::days(4));
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![settlement.id]);
    assert_eq!(h.status(settlement.id), SettlementStatus::Closed);
}

// ============================================================================
// Verification gate
// ============================================================================

#[tokio::test]
async fn test_high_value_settlement_waits_for_verification() {
    let oracle = Arc::new(InMemoryVerificationOracle::new());
    let config = LifecycleConfig {
        verification_threshold: 100.0,
        ..LifecycleConfig::default()
    };
    let verifier: Arc<dyn IVerificationOracle> = oracle.clone();
    let h = Harness::with(config, Some(verifier));

    let cheap = h.propose(10.0, 10.0).await;
    let expensive = h.propose(80.0, 40.0).await;
    assert!(!cheap.requires_verification());
    assert!(expensive.requires_verification());

    h.ledger.accept(cheap.id, true, true);
    h.ledger.accept(expensive.id, true, true);

    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![cheap.id]);
    assert_eq!(report.deferred, 1);

    oracle.set(expensive.id, VerificationStatus::InProgress);
    let outcome = h.lifecycle.close_settlement(expensive.id).await.unwrap();
    assert_eq!(outcome, ClosureOutcome::Deferred(DeferReason::VerificationOutstanding));
    assert_eq!(
        h.lifecycle.get_settlement(expensive.id).unwrap().verification,
        VerificationStatus::InProgress
    );

    oracle.set(expensive.id, VerificationStatus::ConsensusReached);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![expensive.id]);
    assert!((h.ledger.payout_for(expensive.id).unwrap() - 1.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_verification_rejects() {
    let oracle = Arc::new(InMemoryVerificationOracle::new());
    let config = LifecycleConfig {
        verification_threshold: 0.0,
        ..LifecycleConfig::default()
    };
    let verifier: Arc<dyn IVerificationOracle> = oracle.clone();
    let h = Harness::with(config, Some(verifier));

    let settlement = h.propose(5.0, 5.0).await;
    h.ledger.accept(settlement.id, true, true);
    oracle.set(settlement.id, VerificationStatus::ConsensusFailed);

    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(
        report.rejected,
        vec![(settlement.id, RejectionReason::VerificationFailed)]
    );
    assert!(h.ledger.payout_for(settlement.id).is_none());
}

// ============================================================================
// Ledger-side status
// ============================================================================

#[tokio::test]
async fn test_ledger_rejection_is_mirrored() {
    let h = Harness::new();
    let settlement = h.propose(3.0, 4.0).await;
    h.ledger.set_settlement_status(settlement.id, SettlementStatus::Rejected);

    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(
        report.rejected,
        vec![(settlement.id, RejectionReason::RejectedByLedger)]
    );
    assert!(!h.lifecycle.is_active(settlement.id));
}

#[tokio::test]
async fn test_unsubmitted_settlement_is_not_monitored() {
    let h = Harness::new();
    let (a, b) = intent_pair(1.0, 2.0);
    let settlement = h.lifecycle.create_settlement(&a, &b, &negotiation()).unwrap();

    assert_eq!(h.lifecycle.settlement_count(), 1);
    assert_eq!(h.lifecycle.active_count(), 0);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 0);
    assert_eq!(h.ledger.call_count(LedgerOp::GetSettlementStatus), 0);

    // failed submission leaves it unmonitored; a retry goes through
    h.ledger.fail_next(LedgerOp::SubmitSettlement, 3);
    assert!(h.lifecycle.submit_settlement(settlement.id).await.is_err());
    assert!(!h.lifecycle.is_active(settlement.id));
    h.lifecycle.submit_settlement(settlement.id).await.unwrap();
    assert!(h.lifecycle.is_active(settlement.id));
    assert_eq!(h.ledger.settlement_count(), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_passes_pay_out_once() {
    let h = Harness::new();
    let mut ids = Vec::new();
    for i in 0..20 {
        let s = h.propose(i as f64 + 1.0, 1.0).await;
        h.ledger.accept(s.id, true, true);
        ids.push(s.id);
    }

    let passes = (0..4).map(|_| {
        let lifecycle = h.lifecycle.clone();
        tokio::spawn(async move { lifecycle.monitor_settlements().await })
    });
    let reports = futures::future::join_all(passes).await;

    let closed: usize = reports
        .into_iter()
        .map(|r| r.expect("monitor task").closed.len())
        .sum();
    assert_eq!(closed, ids.len());
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), ids.len() as u64);
    for id in ids {
        assert_eq!(h.status(id), SettlementStatus::Closed);
    }
    assert_eq!(h.lifecycle.active_count(), 0);
}
