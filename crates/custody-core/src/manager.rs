use crate::address::{AddressValidator, Base58AddressValidator};
use crate::connectors::{BalanceProvider, Collaborators, LedgerClient};
use crate::error::{CollaboratorError, TransactionError};
use crate::fee::{FeeConfig, FeeEstimator};
use crate::history::HistoryStore;
use crate::poller::{PollerConfig, StatusPoller};
use crate::registry::{PendingTransactionRegistry, TransactionEvent, DEFAULT_RECEIPT_RETENTION};
use crate::risk::{RiskEngineConfig, RiskEvaluator};
use crate::submitter::TransactionSubmitter;
use crate::types::{
    AgentContext, FailureReason, HistoryEntry, LedgerStatus, PendingTransaction, Recommendation,
    RiskAssessment, RiskTolerance, StatusReport, TransactionReceipt, TransactionRequest,
    TransactionStatus,
};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

/// What to do with a `warn` recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WarnPolicy {
    /// Submit and annotate the receipt with the assessment.
    #[default]
    Proceed,
    /// Refuse unless the request acknowledges the warning.
    RequireAcknowledgement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmountLimits {
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Ceiling on a sender's outflow over the trailing 24 hours.
    pub daily_limit: Option<Decimal>,
}

impl Default for AmountLimits {
    fn default() -> Self {
        Self {
            min_amount: Decimal::new(1, 6),
            max_amount: Decimal::new(100_000, 0),
            daily_limit: None,
        }
    }
}

/// Immutable pipeline configuration supplied at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub risk: RiskEngineConfig,
    pub fees: FeeConfig,
    pub limits: AmountLimits,
    pub poller: PollerConfig,
    pub warn_policy: WarnPolicy,
    /// History entries loaded by `context_for`.
    pub context_history: usize,
    /// Terminal receipts kept for status queries.
    pub receipt_retention: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            risk: RiskEngineConfig::default(),
            fees: FeeConfig::default(),
            limits: AmountLimits::default(),
            poller: PollerConfig::default(),
            warn_policy: WarnPolicy::default(),
            context_history: 100,
            receipt_retention: DEFAULT_RECEIPT_RETENTION,
        }
    }
}

/// Façade over the send pipeline and the in-flight transaction state.
pub struct TransactionManager {
    config: PipelineConfig,
    validator: Arc<dyn AddressValidator>,
    risk: RiskEvaluator,
    fees: FeeEstimator,
    submitter: TransactionSubmitter,
    registry: Arc<PendingTransactionRegistry>,
    poller: StatusPoller,
    balances: Arc<dyn BalanceProvider>,
    ledger: Arc<dyn LedgerClient>,
    history: Arc<dyn HistoryStore>,
    wallet_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TransactionManager {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let registry = Arc::new(PendingTransactionRegistry::with_retention(
            config.receipt_retention,
        ));
        let poller = StatusPoller::new(
            collaborators.ledger.clone(),
            registry.clone(),
            config.poller.clone(),
        );
        Self {
            validator: Arc::new(Base58AddressValidator::default()),
            risk: RiskEvaluator::new(config.risk.clone()),
            fees: FeeEstimator::new(collaborators.fees, config.fees.clone()),
            submitter: TransactionSubmitter::new(collaborators.ledger.clone()),
            registry,
            poller,
            balances: collaborators.balances,
            ledger: collaborators.ledger,
            history: collaborators.history,
            wallet_locks: DashMap::new(),
            config,
        }
    }

    pub fn with_address_validator(mut self, validator: Arc<dyn AddressValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<PendingTransactionRegistry> {
        self.registry.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.registry.subscribe()
    }

    /// Address and amount checks that need no collaborator. Runs first on every send.
    pub fn validate(&self, request: &TransactionRequest) -> Result<(), TransactionError> {
        for address in [&request.recipient, &request.sender] {
            if !self.validator.is_valid(address) {
                debug!(address = %address, "address failed validation");
                return Err(TransactionError::InvalidAddress(address.clone()));
            }
        }
        self.validate_amount(request.amount)
    }

    /// Validate, assess, submit and start tracking a transfer.
    ///
    /// Returns as soon as the ledger has accepted the submission; the receipt is
    /// `pending` and later transitions are observed through the registry. On success
    /// the transfer is appended to `context` and to the history store.
    ///
    /// Sends from the same wallet are serialized; funds held by the wallet's pending
    /// transactions are not available to later sends, and the daily limit also counts
    /// every transfer already recorded in the history store.
    #[instrument(
        skip(self, request, context),
        fields(trace_id = %request.trace_id, sender = %request.sender, amount = %request.amount)
    )]
    pub async fn send_transaction(
        &self,
        request: &TransactionRequest,
        context: &mut AgentContext,
    ) -> Result<TransactionReceipt, TransactionError> {
        self.validate(request)?;

        let lock = self.wallet_lock(&request.sender);
        let result = {
            let _guard = lock.lock().await;
            self.send_locked(request, context).await
        };
        drop(lock);
        self.release_wallet_lock(&request.sender);
        result
    }

    /// Like [`send_transaction`](Self::send_transaction), with the context snapshot
    /// taken from the balance provider and history store once the wallet is locked.
    #[instrument(
        skip(self, request),
        fields(trace_id = %request.trace_id, sender = %request.sender, amount = %request.amount)
    )]
    pub async fn send_with_fresh_context(
        &self,
        request: &TransactionRequest,
        risk_tolerance: RiskTolerance,
    ) -> Result<TransactionReceipt, TransactionError> {
        self.validate(request)?;

        let lock = self.wallet_lock(&request.sender);
        let result = {
            let _guard = lock.lock().await;
            match self.context_for(&request.sender, risk_tolerance).await {
                Ok(mut context) => self.send_locked(request, &mut context).await,
                Err(err) => Err(err),
            }
        };
        drop(lock);
        self.release_wallet_lock(&request.sender);
        result
    }

    async fn send_locked(
        &self,
        request: &TransactionRequest,
        context: &mut AgentContext,
    ) -> Result<TransactionReceipt, TransactionError> {
        self.check_daily_limit(request, context).await?;
        let available = self.available_balance(&request.sender).await?;
        if request.amount > available {
            debug!(available = %available, "insufficient balance");
            return Err(TransactionError::InsufficientBalance {
                requested: request.amount,
                available,
            });
        }

        let assessment = self.risk.evaluate(request, context);
        let recommendation = assessment.recommendation;
        match recommendation {
            Recommendation::Reject => {
                warn!(
                    risk_score = %assessment.risk_score,
                    factors = ?assessment.factors,
                    "rejected by risk engine"
                );
                return Err(TransactionError::RejectedByRisk(Box::new(assessment)));
            }
            Recommendation::Warn
                if self.config.warn_policy == WarnPolicy::RequireAcknowledgement
                    && !request.acknowledge_warning =>
            {
                info!(risk_score = %assessment.risk_score, "risk warning requires acknowledgement");
                return Err(TransactionError::ConfirmationRequired(Box::new(assessment)));
            }
            recommendation => {
                debug!(risk_score = %assessment.risk_score, %recommendation, "risk assessed");
            }
        }

        let fee = self.fees.estimate(request.priority).await;
        let mut receipt = self.submitter.submit(request, fee).await?;
        receipt.risk = Some(assessment);

        let cancel = self.registry.register(receipt.clone())?;
        self.poller.spawn(receipt.id.clone(), cancel);

        let entry = HistoryEntry {
            recipient: receipt.recipient.clone(),
            amount: receipt.amount,
            timestamp: receipt.timestamp,
        };
        context.record(entry.clone());
        if let Err(err) = self.history.append(&request.sender, entry).await {
            warn!(tx_id = %receipt.id, error = %err, "failed to append transaction history");
        }

        info!(tx_id = %receipt.id, fee = %receipt.fee, "transaction pending");
        Ok(receipt)
    }

    /// Risk assessment without validation, submission or any other side effect.
    pub fn assess(&self, request: &TransactionRequest, context: &AgentContext) -> RiskAssessment {
        self.risk.evaluate(request, context)
    }

    /// Build a context snapshot from the balance provider and history store.
    pub async fn context_for(
        &self,
        wallet: &str,
        risk_tolerance: RiskTolerance,
    ) -> Result<AgentContext, TransactionError> {
        let wallet_balance = self.available_balance(wallet).await?;
        let recent = self
            .history
            .recent(wallet, self.config.context_history)
            .await
            .map_err(collaborator_failure)?;
        Ok(AgentContext::new(wallet_balance)
            .with_tolerance(risk_tolerance)
            .with_history(recent))
    }

    /// Most recent transfers out of `wallet`, newest first.
    pub async fn history(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, TransactionError> {
        let mut entries = self
            .history
            .recent(wallet, limit)
            .await
            .map_err(collaborator_failure)?;
        entries.reverse();
        Ok(entries)
    }

    /// Last known state of `id`. Ids this pipeline never submitted are looked up on the
    /// ledger; `None` when the ledger does not know them either.
    pub async fn transaction_status(
        &self,
        id: &str,
    ) -> Result<Option<StatusReport>, TransactionError> {
        if let Some(receipt) = self.registry.receipt(id) {
            return Ok(Some(StatusReport {
                id: receipt.id.clone(),
                status: receipt.status,
                confirmations: receipt.confirmations,
                failure: receipt.failure.clone(),
                receipt: Some(receipt),
            }));
        }

        let status = match self.ledger.status(id).await {
            Ok(status) => status,
            Err(CollaboratorError::Rejected(detail)) => {
                debug!(tx_id = %id, detail = %detail, "ledger does not know transaction");
                return Ok(None);
            }
            Err(err) => return Err(collaborator_failure(err)),
        };

        let (status, confirmations, failure) = match status {
            LedgerStatus::Pending { confirmations } => {
                (TransactionStatus::Pending, confirmations, None)
            }
            LedgerStatus::Confirmed { confirmations } => {
                (TransactionStatus::Confirmed, confirmations, None)
            }
            LedgerStatus::Failed { error } => (
                TransactionStatus::Failed,
                0,
                Some(FailureReason::Ledger {
                    message: error.unwrap_or_default(),
                }),
            ),
        };
        Ok(Some(StatusReport {
            id: id.to_string(),
            status,
            confirmations,
            failure,
            receipt: None,
        }))
    }

    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        self.registry.pending_transactions()
    }

    /// Wait for `id` to reach a terminal state.
    pub async fn await_terminal(&self, id: &str) -> Option<TransactionReceipt> {
        self.registry.wait_terminal(id).await
    }

    /// Stop every poller. Pending receipts keep their last known status.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.registry.cancel_all();
        info!(cancelled, "transaction tracking stopped");
        cancelled
    }

    fn validate_amount(&self, amount: Decimal) -> Result<(), TransactionError> {
        let limits = &self.config.limits;
        if amount <= Decimal::ZERO {
            return Err(TransactionError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if amount < limits.min_amount {
            return Err(TransactionError::Validation(format!(
                "amount is below the minimum of {}",
                limits.min_amount
            )));
        }
        if amount > limits.max_amount {
            return Err(TransactionError::Validation(format!(
                "amount exceeds the maximum of {}",
                limits.max_amount
            )));
        }
        Ok(())
    }

    /// Outflow is the larger of what the caller's context and the history store have
    /// seen over the trailing 24 hours. Must run with the sender's wallet lock held.
    async fn check_daily_limit(
        &self,
        request: &TransactionRequest,
        context: &AgentContext,
    ) -> Result<(), TransactionError> {
        let Some(limit) = self.config.limits.daily_limit else {
            return Ok(());
        };
        let now = Utc::now();
        let window = Duration::hours(24);
        let recorded = self
            .history
            .recent(&request.sender, self.config.context_history)
            .await
            .map_err(collaborator_failure)?;
        let recorded = AgentContext::new(Decimal::ZERO).with_history(recorded);
        let spent = context
            .spent_since(now, window)
            .max(recorded.spent_since(now, window));
        if spent.saturating_add(request.amount) > limit {
            return Err(TransactionError::Validation(format!(
                "daily limit of {limit} exceeded ({spent} already sent in the last 24 hours)"
            )));
        }
        Ok(())
    }

    /// Provider balance minus funds held by the wallet's pending transactions.
    async fn available_balance(&self, wallet: &str) -> Result<Decimal, TransactionError> {
        let balance = self
            .balances
            .balance(wallet)
            .await
            .map_err(collaborator_failure)?;
        let reserved = self.registry.reserved_amount(wallet);
        Ok((balance - reserved).max(Decimal::ZERO))
    }

    fn wallet_lock(&self, wallet: &str) -> Arc<Mutex<()>> {
        self.wallet_locks
            .entry(wallet.to_string())
            .or_default()
            .clone()
    }

    /// Drop the wallet's lock once no send holds or waits on it.
    fn release_wallet_lock(&self, wallet: &str) {
        self.wallet_locks.remove_if(wallet, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn collaborator_failure(err: CollaboratorError) -> TransactionError {
    match err {
        CollaboratorError::Network(detail) => TransactionError::Network(detail),
        other => TransactionError::Network(other.to_string()),
    }
}
