//! Challenges against proposed settlements: filing, ledger resolution,
//! the upheld-challenge veto and challenger reputation.

use accord_core::{ChallengeStatus, RejectionReason, SettlementStatus};
use accord_gateway::LedgerOp;
use accord_integration_tests::{Harness, MEDIATOR_ID, contradiction};
use accord_settlement::{ChallengeDetector, ChallengeResolution, SettlementError};
use chrono::Duration;

/// Poll challenges and record the resolutions on their settlements, the way
/// the node's challenge loop does.
async fn challenge_pass(h: &Harness) -> Vec<ChallengeResolution> {
    let resolutions = h.challenges.monitor_challenges().await;
    for r in &resolutions {
        h.lifecycle
            .apply_challenge_resolution(r.settlement_id, r.challenge_id, r.status)
            .expect("settlement on record");
    }
    resolutions
}

// ============================================================================
// Veto
// ============================================================================

#[tokio::test]
async fn test_upheld_challenge_vetoes_accepted_settlement() {
    let h = Harness::new();
    let settlement = h.propose(40.0, 60.0).await;

    let analysis = contradiction(0.92);
    assert!(ChallengeDetector::new(0.8).should_challenge(&analysis));
    let challenge = h.challenges.submit_challenge(&settlement, &analysis).await.unwrap();
    assert!(h.lifecycle.attach_challenge(challenge.clone()).unwrap());
    assert_eq!(challenge.challenger_id, MEDIATOR_ID);
    assert_eq!(h.ledger.challenge(challenge.id).unwrap().status, ChallengeStatus::Pending);

    // still waiting on both parties
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.deferred, 1);

    h.ledger.resolve_challenge(challenge.id, ChallengeStatus::Upheld);
    h.clock.advance(Duration::seconds(60));
    let resolutions = challenge_pass(&h).await;
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].status, ChallengeStatus::Upheld);
    assert_eq!(resolutions[0].settlement_id, settlement.id);

    h.ledger.accept(settlement.id, true, true);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(
        report.rejected,
        vec![(settlement.id, RejectionReason::ChallengeUpheld)]
    );
    assert!(h.ledger.payout_for(settlement.id).is_none());
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 0);

    let record = h.reputation.get(MEDIATOR_ID);
    assert_eq!(record.upheld_challenges, 1);
    assert_eq!(record.failed_challenges, 0);
    assert_eq!(record.penalty_score(), 0.0);
}

#[tokio::test]
async fn test_upheld_on_ledger_vetoes_before_challenge_poll() {
    let h = Harness::new();
    let settlement = h.propose(5.0, 5.0).await;
    let challenge = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.9))
        .await
        .unwrap();

    h.ledger.resolve_challenge(challenge.id, ChallengeStatus::Upheld);
    h.ledger.accept(settlement.id, true, true);

    // the settlement poll carries the ledger's view of the challenge
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(
        report.rejected,
        vec![(settlement.id, RejectionReason::ChallengeUpheld)]
    );
    let record = h.lifecycle.get_settlement(settlement.id).unwrap();
    assert_eq!(record.challenges.len(), 1);
    assert_eq!(record.challenges[0].status, ChallengeStatus::Upheld);

    // the challenge side still sees the resolution once; the settlement
    // record is frozen
    h.clock.advance(Duration::seconds(60));
    assert_eq!(challenge_pass(&h).await.len(), 1);
    assert!(challenge_pass(&h).await.is_empty());
    assert_eq!(h.status(settlement.id), SettlementStatus::Rejected);
    assert_eq!(h.challenges.get_challenge_stats().upheld, 1);
}

// ============================================================================
// Rejected challenges
// ============================================================================

#[tokio::test]
async fn test_rejected_challenge_penalises_challenger_and_settlement_closes() {
    let h = Harness::new();
    let settlement = h.propose(20.0, 30.0).await;
    let challenge = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.85))
        .await
        .unwrap();
    h.lifecycle.attach_challenge(challenge.clone()).unwrap();

    h.ledger.resolve_challenge(challenge.id, ChallengeStatus::Rejected);
    h.clock.advance(Duration::seconds(60));
    let resolutions = challenge_pass(&h).await;
    assert_eq!(resolutions[0].status, ChallengeStatus::Rejected);

    assert_eq!(h.reputation.failed_challenges(MEDIATOR_ID), 1);
    assert_eq!(h.reputation.get(MEDIATOR_ID).penalty_score(), 1.0);

    h.ledger.accept(settlement.id, true, true);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![settlement.id]);
    assert!((h.ledger.payout_for(settlement.id).unwrap() - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_reputation_accumulates_across_settlements() {
    let h = Harness::new();
    let outcomes = [
        ChallengeStatus::Rejected,
        ChallengeStatus::Upheld,
        ChallengeStatus::Rejected,
        ChallengeStatus::Rejected,
    ];

    for status in outcomes {
        let settlement = h.propose(1.0, 1.0).await;
        let challenge = h
            .challenges
            .submit_challenge(&settlement, &contradiction(0.9))
            .await
            .unwrap();
        h.ledger.resolve_challenge(challenge.id, status);
    }

    h.clock.advance(Duration::seconds(60));
    assert_eq!(challenge_pass(&h).await.len(), 4);

    let record = h.reputation.get(MEDIATOR_ID);
    assert_eq!(record.failed_challenges, 3);
    assert_eq!(record.upheld_challenges, 1);
    assert!((record.penalty_score() - 0.75).abs() < 1e-9);

    let stats = h.challenges.get_challenge_stats();
    assert_eq!(stats.submitted, 4);
    assert_eq!(stats.rejected, 3);
    assert_eq!(stats.upheld, 1);
    assert_eq!(stats.pending, 0);
}

// ============================================================================
// Filing rules
// ============================================================================

#[tokio::test]
async fn test_one_pending_challenge_per_settlement() {
    let h = Harness::new();
    let settlement = h.propose(2.0, 2.0).await;

    let first = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.9))
        .await
        .unwrap();
    let err = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.95))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::ChallengeAlreadyPending(id) if id == settlement.id));
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitChallenge), 1);

    // once resolved, a new challenge may be filed
    h.ledger.resolve_challenge(first.id, ChallengeStatus::Rejected);
    h.clock.advance(Duration::seconds(60));
    challenge_pass(&h).await;
    let second = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.95))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(h.challenges.tracked_challenge(settlement.id).unwrap().id, second.id);
}

#[tokio::test]
async fn test_terminal_settlement_cannot_be_challenged() {
    let h = Harness::new();
    let settlement = h.propose(2.0, 2.0).await;
    h.ledger.accept(settlement.id, true, true);
    h.lifecycle.monitor_settlements().await;

    let closed = h.lifecycle.get_settlement(settlement.id).unwrap();
    let err = h
        .challenges
        .submit_challenge(&closed, &contradiction(0.99))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Terminal { .. }));
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitChallenge), 0);
}

#[tokio::test]
async fn test_failed_submission_is_not_tracked() {
    let h = Harness::new();
    let settlement = h.propose(2.0, 2.0).await;

    h.ledger.fail_next(LedgerOp::SubmitChallenge, 3);
    let err = h
        .challenges
        .submit_challenge(&settlement, &contradiction(0.9))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Gateway(_)));
    assert!(h.challenges.tracked_challenge(settlement.id).is_none());

    let stats = h.challenges.get_challenge_stats();
    assert_eq!(stats.submission_failures, 1);
    assert_eq!(stats.submitted, 0);
}

#[test]
fn test_detector_filters_weak_analyses() {
    let detector = ChallengeDetector::new(0.8);
    assert!(!detector.should_challenge(&contradiction(0.79)));
    assert!(detector.should_challenge(&contradiction(0.8)));

    let mut no_constraints = contradiction(0.99);
    no_constraints.violated_constraints.clear();
    assert!(!detector.should_challenge(&no_constraints));

    let mut no_contradiction = contradiction(0.99);
    no_contradiction.has_contradiction = false;
    assert!(!detector.should_challenge(&no_contradiction));
}
