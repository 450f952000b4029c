//! HTTP API server for the mediator node.
//!
//! Provides REST endpoints for node status, settlement creation and
//! inspection, manual closure attempts, filing challenges, and challenge /
//! reputation statistics.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use accord_core::{Challenge, ContradictionAnalysis, Intent, NegotiationResult, Settlement, SettlementId};
use accord_gateway::CircuitBreakerStats;
use accord_settlement::{ChallengeStats, ClosureOutcome, SettlementError};

use crate::state::NodeState;

// --- Response types ---

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub node_name: String,
    pub mediator_id: String,
    pub uptime_secs: u64,
    pub active_settlements: usize,
    pub total_settlements: usize,
    pub ledger: CircuitBreakerStats,
    pub challenges: ChallengeStats,
}

#[derive(Serialize)]
pub struct SettlementsResponse {
    pub settlements: Vec<Settlement>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct CloseResponse {
    pub settlement_id: SettlementId,
    /// `closed`, `rejected`, `deferred` or `payout_failed`.
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CloseResponse {
    fn new(settlement_id: SettlementId, outcome: ClosureOutcome) -> Self {
        let (outcome, reason) = match outcome {
            ClosureOutcome::Closed => ("closed", None),
            ClosureOutcome::Rejected(reason) => ("rejected", Some(reason.to_string())),
            ClosureOutcome::Deferred(reason) => ("deferred", Some(reason.to_string())),
            ClosureOutcome::PayoutFailed => ("payout_failed", None),
        };
        Self {
            settlement_id,
            outcome: outcome.into(),
            reason,
        }
    }
}

#[derive(Serialize)]
pub struct ReputationResponse {
    pub challenger_id: String,
    pub failed_challenges: u64,
    pub upheld_challenges: u64,
    pub penalty_score: f64,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct CreateSettlementRequest {
    pub intent_a: Intent,
    pub intent_b: Intent,
    pub negotiation: NegotiationResult,
}

#[derive(Deserialize)]
pub struct FileChallengeRequest {
    pub analysis: ContradictionAnalysis,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

impl From<SettlementError> for ErrorResponse {
    fn from(e: SettlementError) -> Self {
        Self { error: e.to_string() }
    }
}

fn settlement_error(e: SettlementError) -> ApiError {
    let status = match &e {
        SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::Terminal { .. }
        | SettlementError::InFlight(_)
        | SettlementError::ChallengeAlreadyPending(_) => StatusCode::CONFLICT,
        SettlementError::Core(_) => StatusCode::BAD_REQUEST,
        SettlementError::Gateway(g) if g.is_circuit_open() => StatusCode::SERVICE_UNAVAILABLE,
        SettlementError::Gateway(_) | SettlementError::Verification(_) => StatusCode::BAD_GATEWAY,
    };
    (status, Json(e.into()))
}

// --- Handlers ---

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}

async fn handle_status(State(state): State<Arc<NodeState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_name: state.node_name.clone(),
        mediator_id: state.mediator_id.clone(),
        uptime_secs: state.uptime_secs(),
        active_settlements: state.lifecycle.active_count(),
        total_settlements: state.lifecycle.settlement_count(),
        ledger: state.gateway.breaker_stats(),
        challenges: state.challenges.get_challenge_stats(),
    })
}

async fn handle_list_settlements(State(state): State<Arc<NodeState>>) -> Json<SettlementsResponse> {
    let settlements = state.lifecycle.get_active_settlements();
    let count = settlements.len();
    Json(SettlementsResponse { settlements, count })
}

async fn handle_get_settlement(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<SettlementId>,
) -> Result<Json<Settlement>, ApiError> {
    state
        .lifecycle
        .get_settlement(id)
        .map(Json)
        .ok_or_else(|| settlement_error(SettlementError::NotFound(id)))
}

/// Create a settlement and submit it to the ledger.
///
/// A settlement that was created but could not be submitted stays on record
/// and can be submitted again through `/settlements/{id}/submit`.
async fn handle_create_settlement(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<CreateSettlementRequest>,
) -> Result<(StatusCode, Json<Settlement>), ApiError> {
    let settlement = state
        .lifecycle
        .create_settlement(&req.intent_a, &req.intent_b, &req.negotiation)
        .map_err(settlement_error)?;
    submit_and_fetch(&state, settlement.id)
        .await
        .map(|s| (StatusCode::CREATED, s))
}

async fn handle_submit_settlement(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<SettlementId>,
) -> Result<Json<Settlement>, ApiError> {
    submit_and_fetch(&state, id).await
}

async fn submit_and_fetch(state: &NodeState, id: SettlementId) -> Result<Json<Settlement>, ApiError> {
    state.lifecycle.submit_settlement(id).await.map_err(|e| {
        let (status, Json(body)) = settlement_error(e);
        error(status, format!("settlement {id} not submitted: {}", body.error))
    })?;
    state
        .lifecycle
        .get_settlement(id)
        .map(Json)
        .ok_or_else(|| settlement_error(SettlementError::NotFound(id)))
}

async fn handle_close_settlement(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<SettlementId>,
) -> Result<Json<CloseResponse>, ApiError> {
    let outcome = state
        .lifecycle
        .close_settlement(id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(CloseResponse::new(id, outcome)))
}

async fn handle_file_challenge(
    State(state): State<Arc<NodeState>>,
    Path(id): Path<SettlementId>,
    Json(req): Json<FileChallengeRequest>,
) -> Result<(StatusCode, Json<Challenge>), ApiError> {
    if !state.challenges_enabled {
        return Err(error(StatusCode::FORBIDDEN, "challenges are disabled on this node"));
    }
    let settlement = state
        .lifecycle
        .get_settlement(id)
        .ok_or_else(|| settlement_error(SettlementError::NotFound(id)))?;
    if !state.detector.should_challenge(&req.analysis) {
        return Err(error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "analysis does not warrant a challenge (min confidence {})",
                state.detector.min_confidence()
            ),
        ));
    }

    let challenge = state
        .challenges
        .submit_challenge(&settlement, &req.analysis)
        .await
        .map_err(settlement_error)?;
    if let Err(e) = state.lifecycle.attach_challenge(challenge.clone()) {
        tracing::warn!(settlement_id = %id, error = %e, "filed challenge not attached to settlement");
    }
    Ok((StatusCode::CREATED, Json(challenge)))
}

async fn handle_challenge_stats(State(state): State<Arc<NodeState>>) -> Json<ChallengeStats> {
    Json(state.challenges.get_challenge_stats())
}

async fn handle_reputation(
    State(state): State<Arc<NodeState>>,
    Path(challenger_id): Path<String>,
) -> Json<ReputationResponse> {
    let record = state.reputation.get(&challenger_id);
    Json(ReputationResponse {
        challenger_id,
        failed_challenges: record.failed_challenges,
        upheld_challenges: record.upheld_challenges,
        penalty_score: record.penalty_score(),
    })
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/status", get(handle_status))
        .route(
            "/api/v1/settlements",
            get(handle_list_settlements).post(handle_create_settlement),
        )
        .route("/api/v1/settlements/{id}", get(handle_get_settlement))
        .route("/api/v1/settlements/{id}/submit", post(handle_submit_settlement))
        .route("/api/v1/settlements/{id}/close", post(handle_close_settlement))
        .route("/api/v1/settlements/{id}/challenges", post(handle_file_challenge))
        .route("/api/v1/challenges/stats", get(handle_challenge_stats))
        .route("/api/v1/reputation/{challenger_id}", get(handle_reputation))
        .with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: Arc<NodeState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listen_addr = listener.local_addr()?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
