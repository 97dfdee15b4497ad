use crate::error::CollaboratorError;
use crate::history::HistoryStore;
use crate::types::{LedgerStatus, SubmitAck, TransferPayload};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Source of wallet balances.
///
/// Answers may be stale; the pipeline does not force a refresh before each send.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn balance(&self, address: &str) -> Result<Decimal, CollaboratorError>;
}

/// Source of the ledger's current base fee.
#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn base_fee(&self) -> Result<Decimal, CollaboratorError>;
}

/// Submit and status endpoints of the external ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit(&self, payload: &TransferPayload) -> Result<SubmitAck, CollaboratorError>;

    async fn status(&self, id: &str) -> Result<LedgerStatus, CollaboratorError>;
}

/// Bundle of collaborators injected into the transaction manager at startup.
#[derive(Clone)]
pub struct Collaborators {
    pub balances: Arc<dyn BalanceProvider>,
    pub fees: Arc<dyn FeeOracle>,
    pub ledger: Arc<dyn LedgerClient>,
    pub history: Arc<dyn HistoryStore>,
}

impl Collaborators {
    pub fn new(
        balances: Arc<dyn BalanceProvider>,
        fees: Arc<dyn FeeOracle>,
        ledger: Arc<dyn LedgerClient>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            balances,
            fees,
            ledger,
            history,
        }
    }
}
