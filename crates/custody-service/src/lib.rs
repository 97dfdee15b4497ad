#![deny(unsafe_code)]

pub mod config;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crate::config::{BackendConfig, OpeningBalance, ServiceConfig};
use custody_adapters::{GatewayError, HttpGateway, SimulatedLedger};
use custody_core::{
    Collaborators, HistoryEntry, InMemoryHistoryStore, PendingTransaction, RiskAssessment,
    RiskTolerance, StatusReport, TransactionError, TransactionManager, TransactionReceipt,
    TransactionRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ServiceState {
    pub manager: Arc<TransactionManager>,
    pub backend: &'static str,
}

impl ServiceState {
    pub fn new(manager: Arc<TransactionManager>, backend: &'static str) -> Self {
        Self { manager, backend }
    }

    pub fn bootstrap(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let history = Arc::new(InMemoryHistoryStore::new());
        let (collaborators, backend) = match &config.backend {
            BackendConfig::Simulated {
                confirm_after,
                base_fee,
                balances,
            } => {
                let ledger = Arc::new(
                    SimulatedLedger::new()
                        .with_confirm_after(*confirm_after)
                        .with_base_fee(*base_fee),
                );
                for opening in balances {
                    ledger.fund(&opening.address, opening.amount);
                }
                (
                    Collaborators::new(ledger.clone(), ledger.clone(), ledger, history),
                    "simulated",
                )
            }
            BackendConfig::Http { url, timeout_ms } => {
                let gateway =
                    Arc::new(HttpGateway::new(url, Duration::from_millis(*timeout_ms))?);
                info!(url = %gateway.base_url(), "using HTTP wallet gateway");
                (
                    Collaborators::new(gateway.clone(), gateway.clone(), gateway, history),
                    "http",
                )
            }
        };

        let manager = TransactionManager::new(config.pipeline.clone(), collaborators);
        Ok(Self::new(Arc::new(manager), backend))
    }
}

pub fn build_router(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/transactions", post(send_transaction))
        .route("/v1/transactions/pending", get(list_pending))
        .route("/v1/transactions/:id", get(transaction_status))
        .route("/v1/risk/assess", post(assess))
        .route("/v1/wallets/:address/history", get(wallet_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

fn transaction_error_status(err: &TransactionError) -> StatusCode {
    match err {
        TransactionError::InvalidAddress(_) | TransactionError::Validation(_) => {
            StatusCode::BAD_REQUEST
        }
        TransactionError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        TransactionError::RejectedByRisk(_) => StatusCode::FORBIDDEN,
        TransactionError::ConfirmationRequired(_) => StatusCode::PRECONDITION_REQUIRED,
        TransactionError::TransactionFailed(_) => StatusCode::BAD_GATEWAY,
        TransactionError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
        TransactionError::DuplicateTransaction(_) => StatusCode::CONFLICT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Http { status, message } => {
                (status, Json(serde_json::json!({ "error": message }))).into_response()
            }
            ApiError::Transaction(err) => (
                transaction_error_status(&err),
                Json(serde_json::json!({
                    "error": err.to_string(),
                    "code": err.code(),
                    "severity": err.severity(),
                    "action": err.suggested_action(),
                    "assessment": err.assessment(),
                })),
            )
                .into_response(),
        }
    }
}

/// Transaction request plus the owner's risk tolerance for this decision.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBody {
    #[serde(flatten)]
    pub request: TransactionRequest,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    backend: &'static str,
    pending: usize,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "custody-service",
        backend: state.backend,
        pending: state.manager.registry().pending_count(),
    })
}

async fn send_transaction(
    State(state): State<ServiceState>,
    Json(body): Json<TransactionBody>,
) -> Result<(StatusCode, Json<TransactionReceipt>), ApiError> {
    let receipt = state
        .manager
        .send_with_fresh_context(&body.request, body.risk_tolerance)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

async fn assess(
    State(state): State<ServiceState>,
    Json(body): Json<TransactionBody>,
) -> Result<Json<RiskAssessment>, ApiError> {
    state.manager.validate(&body.request)?;
    let context = state
        .manager
        .context_for(&body.request.sender, body.risk_tolerance)
        .await?;
    Ok(Json(state.manager.assess(&body.request, &context)))
}

async fn list_pending(State(state): State<ServiceState>) -> Json<Vec<PendingTransaction>> {
    Json(state.manager.pending_transactions())
}

async fn transaction_status(
    State(state): State<ServiceState>,
    Path(id): Path<String>,
) -> Result<Json<StatusReport>, ApiError> {
    state
        .manager
        .transaction_status(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("transaction '{id}' not found")))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn wallet_history(
    State(state): State<ServiceState>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.manager.history(&address, limit).await?))
}
