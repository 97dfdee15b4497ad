use async_trait::async_trait;
use custody_core::connectors::{BalanceProvider, FeeOracle, LedgerClient};
use custody_core::error::CollaboratorError;
use custody_core::types::{LedgerStatus, SubmitAck, TransferPayload};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct SimulatedTransfer {
    payload: TransferPayload,
    polls: u32,
    settled: Option<LedgerStatus>,
}

/// In-memory ledger for local runs and integration tests.
///
/// Transfers confirm after a fixed number of status polls; balances move only when a
/// transfer settles, so a submitted-but-unconfirmed transfer still shows the old balance.
#[derive(Debug)]
pub struct SimulatedLedger {
    balances: DashMap<String, Decimal>,
    transfers: DashMap<String, SimulatedTransfer>,
    base_fee: Decimal,
    confirm_after: u32,
    failing_recipients: HashSet<String>,
    sequence: AtomicU64,
}

impl Default for SimulatedLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLedger {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            transfers: DashMap::new(),
            base_fee: Decimal::new(5, 6),
            confirm_after: 2,
            failing_recipients: HashSet::new(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_base_fee(mut self, base_fee: Decimal) -> Self {
        self.base_fee = base_fee;
        self
    }

    /// Number of status polls before a transfer settles (at least one).
    pub fn with_confirm_after(mut self, polls: u32) -> Self {
        self.confirm_after = polls.max(1);
        self
    }

    /// Transfers to `recipient` are accepted but fail at settlement.
    pub fn with_failing_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.failing_recipients.insert(recipient.into());
        self
    }

    pub fn fund(&self, address: &str, amount: Decimal) {
        *self.balances.entry(address.to_string()).or_default() += amount;
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    fn signature(&self, payload: &TransferPayload) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let material = serde_json::json!({
            "sequence": sequence,
            "from": payload.from,
            "to": payload.to,
            "amount": payload.amount,
            "fee": payload.fee,
        });
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    fn settle(&self, payload: &TransferPayload, confirmations: u32) -> LedgerStatus {
        if self.failing_recipients.contains(&payload.to) {
            return LedgerStatus::Failed {
                error: Some("recipient account rejected the transfer".to_string()),
            };
        }

        let debit = payload.amount + payload.fee;
        {
            let mut source = self.balances.entry(payload.from.clone()).or_default();
            if *source < debit {
                return LedgerStatus::Failed {
                    error: Some("insufficient funds at settlement".to_string()),
                };
            }
            *source -= debit;
        }
        *self.balances.entry(payload.to.clone()).or_default() += payload.amount;
        LedgerStatus::Confirmed { confirmations }
    }
}

#[async_trait]
impl BalanceProvider for SimulatedLedger {
    async fn balance(&self, address: &str) -> Result<Decimal, CollaboratorError> {
        Ok(self
            .balances
            .get(address)
            .map(|balance| *balance)
            .unwrap_or(Decimal::ZERO))
    }
}

#[async_trait]
impl FeeOracle for SimulatedLedger {
    async fn base_fee(&self) -> Result<Decimal, CollaboratorError> {
        Ok(self.base_fee)
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn submit(&self, payload: &TransferPayload) -> Result<SubmitAck, CollaboratorError> {
        if payload.amount <= Decimal::ZERO {
            return Err(CollaboratorError::Rejected(
                "transfer amount must be positive".to_string(),
            ));
        }
        if payload.from == payload.to {
            return Err(CollaboratorError::Rejected(
                "sender and recipient must differ".to_string(),
            ));
        }

        let id = self.signature(payload);
        self.transfers.insert(
            id.clone(),
            SimulatedTransfer {
                payload: payload.clone(),
                polls: 0,
                settled: None,
            },
        );
        debug!(tx_id = %id, "simulated transfer accepted");
        Ok(SubmitAck {
            id,
            fee: payload.fee,
        })
    }

    async fn status(&self, id: &str) -> Result<LedgerStatus, CollaboratorError> {
        let mut transfer = self
            .transfers
            .get_mut(id)
            .ok_or_else(|| CollaboratorError::Rejected(format!("unknown transaction '{id}'")))?;

        if let Some(settled) = &transfer.settled {
            return Ok(settled.clone());
        }

        transfer.polls += 1;
        if transfer.polls < self.confirm_after {
            return Ok(LedgerStatus::Pending {
                confirmations: transfer.polls,
            });
        }

        let settled = self.settle(&transfer.payload, transfer.polls);
        transfer.settled = Some(settled.clone());
        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::types::Priority;

    const ALICE: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const BOB: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

    fn payload(amount: i64) -> TransferPayload {
        TransferPayload {
            from: ALICE.to_string(),
            to: BOB.to_string(),
            amount: Decimal::new(amount, 0),
            fee: Decimal::new(1, 2),
            memo: None,
            priority: Priority::Medium,
        }
    }

    #[tokio::test]
    async fn settles_after_configured_polls() {
        let ledger = SimulatedLedger::new().with_confirm_after(2);
        ledger.fund(ALICE, Decimal::TEN);

        let ack = ledger.submit(&payload(4)).await.unwrap();
        assert_eq!(
            ledger.status(&ack.id).await.unwrap(),
            LedgerStatus::Pending { confirmations: 1 }
        );
        assert_eq!(ledger.balance(ALICE).await.unwrap(), Decimal::TEN);

        assert_eq!(
            ledger.status(&ack.id).await.unwrap(),
            LedgerStatus::Confirmed { confirmations: 2 }
        );
        assert_eq!(ledger.balance(ALICE).await.unwrap(), Decimal::new(599, 2));
        assert_eq!(ledger.balance(BOB).await.unwrap(), Decimal::new(4, 0));

        // Settled transfers are not applied twice.
        ledger.status(&ack.id).await.unwrap();
        assert_eq!(ledger.balance(BOB).await.unwrap(), Decimal::new(4, 0));
    }

    #[tokio::test]
    async fn underfunded_transfer_fails_at_settlement() {
        let ledger = SimulatedLedger::new().with_confirm_after(1);
        ledger.fund(ALICE, Decimal::ONE);

        let ack = ledger.submit(&payload(4)).await.unwrap();
        match ledger.status(&ack.id).await.unwrap() {
            LedgerStatus::Failed { error } => assert!(error.unwrap().contains("insufficient")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(ledger.balance(ALICE).await.unwrap(), Decimal::ONE);
    }

    #[tokio::test]
    async fn failing_recipient_and_unknown_ids() {
        let ledger = SimulatedLedger::new()
            .with_confirm_after(1)
            .with_failing_recipient(BOB);
        ledger.fund(ALICE, Decimal::TEN);

        let ack = ledger.submit(&payload(1)).await.unwrap();
        assert!(matches!(
            ledger.status(&ack.id).await.unwrap(),
            LedgerStatus::Failed { .. }
        ));
        assert!(matches!(
            ledger.status("missing").await,
            Err(CollaboratorError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn signatures_are_unique_and_malformed_payloads_rejected() {
        let ledger = SimulatedLedger::new();
        let first = ledger.submit(&payload(1)).await.unwrap();
        let second = ledger.submit(&payload(1)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(ledger.transfer_count(), 2);

        assert!(matches!(
            ledger.submit(&payload(0)).await,
            Err(CollaboratorError::Rejected(_))
        ));
    }
}
