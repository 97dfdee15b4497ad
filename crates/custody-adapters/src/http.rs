//! JSON-over-HTTP wallet gateway.

use async_trait::async_trait;
use custody_core::connectors::{BalanceProvider, FeeOracle, LedgerClient};
use custody_core::error::CollaboratorError;
use custody_core::types::{LedgerStatus, SubmitAck, TransferPayload};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<GatewayError> for CollaboratorError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Http(err) if err.is_decode() => Self::InvalidResponse(err.to_string()),
            GatewayError::Http(err) => Self::Network(err.to_string()),
            GatewayError::Api { status, message } if status >= 500 => {
                Self::Network(format!("{status}: {message}"))
            }
            GatewayError::Api { status, message } => Self::Rejected(format!("{status}: {message}")),
            GatewayError::NotFound(path) => Self::Rejected(format!("not found: {path}")),
            GatewayError::Decode(detail) => Self::InvalidResponse(detail),
            GatewayError::InvalidEndpoint(endpoint) => {
                Self::Network(format!("invalid endpoint: {endpoint}"))
            }
        }
    }
}

/// `{ "data": ... }` wrapper used by every gateway response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeData {
    estimated_fee: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    from: &'a str,
    to: &'a str,
    amount: String,
    priority_fee: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    signature: String,
    fee: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: WireStatus,
    #[serde(default)]
    confirmations: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl From<StatusData> for LedgerStatus {
    fn from(data: StatusData) -> Self {
        match data.status {
            WireStatus::Pending => LedgerStatus::Pending {
                confirmations: data.confirmations.unwrap_or(0),
            },
            WireStatus::Confirmed => LedgerStatus::Confirmed {
                confirmations: data.confirmations.unwrap_or(1),
            },
            WireStatus::Failed => LedgerStatus::Failed { error: data.error },
        }
    }
}

/// Balance provider, fee oracle and ledger backed by a wallet gateway HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let base_url = Url::parse(endpoint)
            .map_err(|err| GatewayError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Each segment is percent-encoded, so wallet addresses and ids cannot alter the path.
    fn url(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidEndpoint(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, GatewayError> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        let response = self.client.get(url).send().await?;
        self.handle_response(&path, response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, GatewayError> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        let response = self.client.post(url).json(body).send().await?;
        self.handle_response(&path, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        debug!(path, status = status.as_u16(), "gateway response");

        if status.is_success() {
            let envelope: Envelope<T> = response
                .json()
                .await
                .map_err(|err| GatewayError::Decode(err.to_string()))?;
            Ok(envelope.data)
        } else if status == StatusCode::NOT_FOUND {
            Err(GatewayError::NotFound(path.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl BalanceProvider for HttpGateway {
    async fn balance(&self, address: &str) -> Result<Decimal, CollaboratorError> {
        let data: BalanceData = self.get(&["wallets", address, "balance"]).await?;
        Decimal::from_str(data.amount.trim()).map_err(|err| {
            CollaboratorError::InvalidResponse(format!("balance '{}': {err}", data.amount))
        })
    }
}

#[async_trait]
impl FeeOracle for HttpGateway {
    async fn base_fee(&self) -> Result<Decimal, CollaboratorError> {
        let data: FeeData = self.get(&["fees", "estimate"]).await?;
        Ok(data.estimated_fee)
    }
}

#[async_trait]
impl LedgerClient for HttpGateway {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, payload: &TransferPayload) -> Result<SubmitAck, CollaboratorError> {
        let body = SubmitBody {
            from: &payload.from,
            to: &payload.to,
            amount: payload.amount.to_string(),
            priority_fee: payload.fee,
            memo: payload.memo.as_deref(),
        };
        let data: SubmitData = self.post(&["transactions"], &body).await?;
        Ok(SubmitAck {
            id: data.signature,
            fee: data.fee,
        })
    }

    async fn status(&self, id: &str) -> Result<LedgerStatus, CollaboratorError> {
        let data: StatusData = self.get(&["transactions", id]).await?;
        Ok(data.into())
    }
}
