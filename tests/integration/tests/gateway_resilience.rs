//! Ledger outages as seen by the settlement lifecycle: retries, the circuit
//! breaker opening and recovering, and the HTTP ledger adapter against a
//! mock ledger service.

use std::sync::Arc;
use std::time::Duration;

use accord_core::{ManualClock, SettlementStatus};
use accord_gateway::{
    BreakerConfig, CircuitState, HttpLedger, ILedgerGateway, LedgerOp, RetryPolicy, RetryingGateway,
};
use accord_integration_tests::{Harness, intent_pair, negotiation};
use accord_settlement::{LifecycleConfig, SettlementLifecycle};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Circuit breaker over the in-memory ledger
// ============================================================================

#[tokio::test]
async fn test_breaker_opens_after_failed_passes_and_recovers() {
    let h = Harness::new();
    let settlement = h.propose(10.0, 10.0).await;
    h.ledger.accept(settlement.id, true, true);
    h.ledger.set_unavailable(true);

    // every pass exhausts its retries and counts as one breaker failure
    for pass in 1..=5 {
        let report = h.lifecycle.monitor_settlements().await;
        assert_eq!(report.errors, 1, "pass {pass}");
        assert_eq!(h.ledger.call_count(LedgerOp::GetSettlementStatus), pass * 3);
    }
    assert_eq!(h.gateway.breaker().state(), CircuitState::Open);

    // while open, passes still run but nothing reaches the ledger
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(h.ledger.call_count(LedgerOp::GetSettlementStatus), 15);
    assert_eq!(h.gateway.breaker_stats().rejected_calls, 1);
    assert_eq!(h.status(settlement.id), SettlementStatus::Proposed);
    assert!(h.lifecycle.is_active(settlement.id));

    // the ledger comes back; after the cooldown the probe goes through and
    // the settlement completes in the same pass
    h.ledger.set_unavailable(false);
    h.clock.advance(chrono::Duration::seconds(30));
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![settlement.id]);
    assert_eq!(h.gateway.breaker().state(), CircuitState::Closed);
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 1);
}

#[tokio::test]
async fn test_transient_failures_absorbed_by_retries() {
    let h = Harness::new();
    let settlement = h.propose(10.0, 10.0).await;
    h.ledger.accept(settlement.id, true, true);

    h.ledger.fail_next(LedgerOp::GetSettlementStatus, 2);
    h.ledger.fail_next(LedgerOp::SubmitPayout, 2);
    let report = h.lifecycle.monitor_settlements().await;

    assert_eq!(report.closed, vec![settlement.id]);
    assert_eq!(report.errors, 0);
    assert_eq!(h.ledger.call_count(LedgerOp::GetSettlementStatus), 3);
    assert_eq!(h.ledger.call_count(LedgerOp::SubmitPayout), 3);

    let stats = h.gateway.breaker_stats();
    assert_eq!(stats.state, CircuitState::Closed);
    assert_eq!(stats.total_failures, 0);
}

#[tokio::test]
async fn test_one_failing_settlement_does_not_stop_the_pass() {
    let h = Harness::new();
    let first = h.propose(1.0, 1.0).await;
    let second = h.propose(2.0, 2.0).await;
    h.ledger.accept(first.id, true, true);
    h.ledger.accept(second.id, true, true);

    // three failures exhaust exactly one settlement's status retries
    h.ledger.fail_next(LedgerOp::GetSettlementStatus, 3);
    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.closed.len(), 1);

    let report = h.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed.len(), 1);
    assert_eq!(h.lifecycle.active_count(), 0);
}

// ============================================================================
// HTTP ledger
// ============================================================================

struct HttpStack {
    server: MockServer,
    lifecycle: SettlementLifecycle,
    gateway: Arc<RetryingGateway>,
}

async fn http_stack() -> HttpStack {
    let server = MockServer::start().await;
    let ledger: Arc<dyn ILedgerGateway> =
        Arc::new(HttpLedger::new(server.uri(), Duration::from_secs(2)).unwrap());
    let clock = Arc::new(ManualClock::default());
    let gateway = Arc::new(RetryingGateway::with_clock(
        ledger,
        RetryPolicy::new(3, Duration::from_millis(1)),
        BreakerConfig::default(),
        clock.clone(),
    ));
    let lifecycle =
        SettlementLifecycle::with_clock(gateway.clone(), None, LifecycleConfig::default(), clock);
    HttpStack {
        server,
        lifecycle,
        gateway,
    }
}

fn ack() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "success": true }))
}

#[tokio::test]
async fn test_http_ledger_settlement_roundtrip() {
    let stack = http_stack().await;
    let (a, b) = intent_pair(30.0, 20.0);
    let settlement = stack.lifecycle.create_settlement(&a, &b, &negotiation()).unwrap();

    Mock::given(method("POST"))
        .and(path("/settlements"))
        .respond_with(ack())
        .expect(1)
        .mount(&stack.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/settlements/{}", settlement.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "party_a_accepted": true,
            "party_b_accepted": true,
            "challenges": [],
            "status": "proposed"
        })))
        .mount(&stack.server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/settlements/{}/payout", settlement.id)))
        .respond_with(ack())
        .expect(1)
        .mount(&stack.server)
        .await;

    stack.lifecycle.submit_settlement(settlement.id).await.unwrap();
    let report = stack.lifecycle.monitor_settlements().await;
    assert_eq!(report.closed, vec![settlement.id]);

    // closed, so nothing further is sent
    let report = stack.lifecycle.monitor_settlements().await;
    assert_eq!(report.checked, 0);
}

#[tokio::test]
async fn test_http_ledger_retries_server_errors() {
    let stack = http_stack().await;
    let (a, b) = intent_pair(1.0, 1.0);
    let settlement = stack.lifecycle.create_settlement(&a, &b, &negotiation()).unwrap();

    Mock::given(method("POST"))
        .and(path("/settlements"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&stack.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/settlements"))
        .respond_with(ack())
        .expect(1)
        .mount(&stack.server)
        .await;

    stack.lifecycle.submit_settlement(settlement.id).await.unwrap();
    assert!(stack.lifecycle.is_active(settlement.id));
    assert_eq!(stack.gateway.breaker_stats().total_failures, 0);
}

#[tokio::test]
async fn test_http_ledger_refusal_is_not_retried() {
    let stack = http_stack().await;
    let (a, b) = intent_pair(1.0, 1.0);
    let settlement = stack.lifecycle.create_settlement(&a, &b, &negotiation()).unwrap();

    Mock::given(method("POST"))
        .and(path("/settlements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "duplicate intent"
        })))
        .expect(1)
        .mount(&stack.server)
        .await;

    let err = stack.lifecycle.submit_settlement(settlement.id).await.unwrap_err();
    assert!(err.to_string().contains("duplicate intent"));
    assert!(!stack.lifecycle.is_active(settlement.id));
}

#[tokio::test]
async fn test_http_ledger_unknown_settlement_defers() {
    let stack = http_stack().await;
    let (a, b) = intent_pair(1.0, 1.0);
    let settlement = stack.lifecycle.create_settlement(&a, &b, &negotiation()).unwrap();

    Mock::given(method("POST"))
        .and(path("/settlements"))
        .respond_with(ack())
        .mount(&stack.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/settlements/{}", settlement.id)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&stack.server)
        .await;

    stack.lifecycle.submit_settlement(settlement.id).await.unwrap();
    let report = stack.lifecycle.monitor_settlements().await;
    assert_eq!(report.deferred, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(
        stack.lifecycle.get_settlement(settlement.id).unwrap().status,
        SettlementStatus::Proposed
    );
}
