//! Scripted collaborators for unit tests.

use crate::connectors::{BalanceProvider, FeeOracle, LedgerClient};
use crate::error::CollaboratorError;
use crate::types::{
    LedgerStatus, SubmitAck, TransactionReceipt, TransactionStatus, TransferPayload,
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SENDER: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
pub const RECIPIENT: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";
pub const OTHER_RECIPIENT: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";

pub fn pending_receipt(id: &str, amount: i64) -> TransactionReceipt {
    TransactionReceipt {
        id: id.to_string(),
        sender: SENDER.to_string(),
        recipient: RECIPIENT.to_string(),
        amount: Decimal::new(amount, 0),
        timestamp: Utc::now(),
        fee: Decimal::ZERO,
        status: TransactionStatus::Pending,
        failure: None,
        confirmations: 0,
        risk: None,
    }
}

#[derive(Default)]
pub struct FixedBalances {
    balances: Mutex<HashMap<String, Decimal>>,
    calls: AtomicUsize,
}

impl FixedBalances {
    pub fn with(address: &str, balance: Decimal) -> Self {
        let provider = Self::default();
        provider.set(address, balance);
        provider
    }

    pub fn set(&self, address: &str, balance: Decimal) {
        self.balances
            .lock()
            .unwrap()
            .insert(address.to_string(), balance);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceProvider for FixedBalances {
    async fn balance(&self, address: &str) -> Result<Decimal, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}

pub struct ScriptedFeeOracle {
    answer: Result<Decimal, CollaboratorError>,
}

impl ScriptedFeeOracle {
    pub fn fixed(fee: Decimal) -> Self {
        Self { answer: Ok(fee) }
    }

    pub fn failing(err: CollaboratorError) -> Self {
        Self { answer: Err(err) }
    }
}

#[async_trait]
impl FeeOracle for ScriptedFeeOracle {
    async fn base_fee(&self) -> Result<Decimal, CollaboratorError> {
        self.answer.clone()
    }
}

/// Ledger whose submit and status answers are scripted per test.
///
/// Unscripted status queries answer `pending` with zero confirmations.
#[derive(Default)]
pub struct ScriptedLedger {
    submit_error: Option<CollaboratorError>,
    statuses: Mutex<HashMap<String, VecDeque<Result<LedgerStatus, CollaboratorError>>>>,
    hanging: HashSet<String>,
    hang_all: bool,
    submits: AtomicUsize,
    status_calls: Mutex<HashMap<String, usize>>,
    last_payload: Mutex<Option<TransferPayload>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, detail: &str) -> Self {
        self.submit_error = Some(CollaboratorError::Rejected(detail.to_string()));
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.submit_error = Some(CollaboratorError::Network("connection refused".to_string()));
        self
    }

    pub fn with_statuses(
        self,
        id: &str,
        statuses: impl IntoIterator<Item = Result<LedgerStatus, CollaboratorError>>,
    ) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(id.to_string(), statuses.into_iter().collect());
        self
    }

    pub fn hanging_status(mut self) -> Self {
        self.hang_all = true;
        self
    }

    pub fn hanging_for(mut self, id: &str) -> Self {
        self.hanging.insert(id.to_string());
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self, id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    pub fn last_payload(&self) -> Option<TransferPayload> {
        self.last_payload.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, payload: &TransferPayload) -> Result<SubmitAck, CollaboratorError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_payload.lock().unwrap() = Some(payload.clone());
        if let Some(err) = &self.submit_error {
            return Err(err.clone());
        }
        Ok(SubmitAck {
            id: format!("sig-{n}"),
            fee: payload.fee,
        })
    }

    async fn status(&self, id: &str) -> Result<LedgerStatus, CollaboratorError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default() += 1;
        if self.hang_all || self.hanging.contains(id) {
            std::future::pending::<()>().await;
        }
        let next = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        next.unwrap_or(Ok(LedgerStatus::Pending { confirmations: 0 }))
    }
}
