use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use accord_core::{
    Challenge, ChallengeId, ChallengeStatus, RemoteSettlementStatus, Settlement, SettlementId,
};

use crate::error::LedgerError;
use crate::traits::ILedgerGateway;

/// Acknowledgement body returned by the ledger for submissions.
#[derive(Debug, Deserialize)]
struct LedgerAck {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PayoutRequest {
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct ChallengeStatusResponse {
    status: ChallengeStatus,
}

/// JSON-over-HTTP ledger adapter.
///
/// | Operation | Request |
/// |-----------|---------|
/// | submit settlement | `POST /settlements` |
/// | settlement status | `GET /settlements/{id}` |
/// | payout | `POST /settlements/{id}/payout` |
/// | submit challenge | `POST /challenges` |
/// | challenge status | `GET /challenges/{id}` |
///
/// Connection failures, timeouts and 5xx responses are transient; other
/// non-2xx responses and undecodable bodies are permanent.
pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    /// Create an adapter for the ledger at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, LedgerError> {
        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LedgerError::Timeout
            } else {
                LedgerError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Server {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// Send a submission and interpret the `{success, error?}` acknowledgement.
    async fn submit(&self, request: RequestBuilder) -> Result<(), LedgerError> {
        let resp = self.send(request).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        let ack: LedgerAck = resp
            .json()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))?;
        if ack.success {
            Ok(())
        } else {
            Err(LedgerError::Rejected {
                status: status.as_u16(),
                message: ack.error.unwrap_or_else(|| "submission refused".into()),
            })
        }
    }

    /// Send a query; 404 maps to `None`.
    async fn query<T: for<'de> Deserialize<'de>>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, LedgerError> {
        let resp = self.send(request).await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ILedgerGateway for HttpLedger {
    async fn submit_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        self.submit(self.client.post(self.url("/settlements")).json(settlement))
            .await
    }

    async fn get_settlement_status(
        &self,
        settlement_id: SettlementId,
    ) -> Result<Option<RemoteSettlementStatus>, LedgerError> {
        self.query(self.client.get(self.url(&format!("/settlements/{settlement_id}"))))
            .await
    }

    async fn submit_payout(&self, settlement_id: SettlementId, amount: f64) -> Result<(), LedgerError> {
        self.submit(
            self.client
                .post(self.url(&format!("/settlements/{settlement_id}/payout")))
                .json(&PayoutRequest { amount }),
        )
        .await
    }

    async fn submit_challenge(&self, challenge: &Challenge) -> Result<(), LedgerError> {
        self.submit(self.client.post(self.url("/challenges")).json(challenge))
            .await
    }

    async fn get_challenge_status(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<Option<ChallengeStatus>, LedgerError> {
        let resp: Option<ChallengeStatusResponse> = self
            .query(self.client.get(self.url(&format!("/challenges/{challenge_id}"))))
            .await?;
        Ok(resp.map(|r| r.status))
    }

    fn endpoint_id(&self) -> &str {
        &self.base_url
    }
}
