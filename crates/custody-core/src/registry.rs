use crate::error::TransactionError;
use crate::types::{FailureReason, PendingTransaction, TransactionReceipt, TransactionStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 1024;

/// Terminal receipts kept for status queries before the oldest are dropped.
pub const DEFAULT_RECEIPT_RETENTION: usize = 10_000;

/// Lifecycle notification published by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransactionEvent {
    Registered { id: String, sender: String },
    Confirmations { id: String, confirmations: u32 },
    Confirmed { receipt: TransactionReceipt },
    Failed { receipt: TransactionReceipt },
}

impl TransactionEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Registered { id, .. } | Self::Confirmations { id, .. } => id,
            Self::Confirmed { receipt } | Self::Failed { receipt } => &receipt.id,
        }
    }

    /// Terminal receipt carried by `Confirmed` and `Failed`.
    pub fn terminal_receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            Self::Confirmed { receipt } | Self::Failed { receipt } => Some(receipt),
            _ => None,
        }
    }
}

/// Terminal outcome applied by [`PendingTransactionRegistry::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Confirmed { confirmations: u32 },
    Failed(FailureReason),
}

/// Fires once the owning registry entry is removed.
#[derive(Debug, Clone)]
pub struct CancellationSignal(watch::Receiver<()>);

impl CancellationSignal {
    pub async fn cancelled(&mut self) {
        while self.0.changed().await.is_ok() {}
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.has_changed().is_err()
    }
}

struct PendingSlot {
    sender: String,
    /// Amount plus fee held against the sender's balance until terminal.
    reserved: Decimal,
    confirmations: u32,
    created_at: DateTime<Utc>,
    _cancel: watch::Sender<()>,
}

/// Concurrent map of in-flight transactions keyed by ledger id.
///
/// An id stays in the pending map only while its last known status is `pending`.
/// Removing it drops the slot's watch sender, which is what stops its poller.
/// Receipts are kept after termination as the authoritative last-known state, up to
/// `retention` terminal receipts; older ones are dropped first.
pub struct PendingTransactionRegistry {
    pending: DashMap<String, PendingSlot>,
    receipts: DashMap<String, TransactionReceipt>,
    terminal_order: Mutex<VecDeque<String>>,
    retention: usize,
    events: broadcast::Sender<TransactionEvent>,
}

impl Default for PendingTransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTransactionRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RECEIPT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pending: DashMap::new(),
            receipts: DashMap::new(),
            terminal_order: Mutex::new(VecDeque::new()),
            retention,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransactionEvent> {
        self.events.subscribe()
    }

    /// Track a freshly submitted receipt. Each id can be registered once.
    pub fn register(
        &self,
        receipt: TransactionReceipt,
    ) -> Result<CancellationSignal, TransactionError> {
        if receipt.status.is_terminal() {
            return Err(TransactionError::TransactionFailed(format!(
                "cannot track transaction '{}' in terminal state",
                receipt.id
            )));
        }

        let id = receipt.id.clone();
        let sender = receipt.sender.clone();
        let reserved = receipt.amount.saturating_add(receipt.fee);
        let created_at = receipt.timestamp;

        match self.receipts.entry(id.clone()) {
            Entry::Occupied(_) => return Err(TransactionError::DuplicateTransaction(id)),
            Entry::Vacant(vacant) => {
                vacant.insert(receipt);
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(());
        self.pending.insert(
            id.clone(),
            PendingSlot {
                sender: sender.clone(),
                reserved,
                confirmations: 0,
                created_at,
                _cancel: cancel_tx,
            },
        );

        debug!(tx_id = %id, sender = %sender, "transaction registered");
        let _ = self.events.send(TransactionEvent::Registered { id, sender });
        Ok(CancellationSignal(cancel_rx))
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_transactions(&self) -> Vec<PendingTransaction> {
        let mut snapshot: Vec<_> = self
            .pending
            .iter()
            .map(|slot| PendingTransaction {
                id: slot.key().clone(),
                sender: slot.sender.clone(),
                amount: self
                    .receipts
                    .get(slot.key())
                    .map(|receipt| receipt.amount)
                    .unwrap_or(slot.reserved),
                status: TransactionStatus::Pending,
                confirmations: slot.confirmations,
                created_at: slot.created_at,
            })
            .collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        snapshot
    }

    /// Funds (amount plus fee) still held by the sender's pending transactions.
    pub fn reserved_amount(&self, sender: &str) -> Decimal {
        self.pending
            .iter()
            .filter(|slot| slot.sender == sender)
            .fold(Decimal::ZERO, |total, slot| total.saturating_add(slot.reserved))
    }

    pub fn record_confirmations(&self, id: &str, confirmations: u32) {
        let changed = match self.pending.get_mut(id) {
            Some(mut slot) if slot.confirmations != confirmations => {
                slot.confirmations = confirmations;
                true
            }
            _ => false,
        };
        if !changed {
            return;
        }
        if let Some(mut receipt) = self.receipts.get_mut(id) {
            receipt.confirmations = confirmations;
        }
        let _ = self.events.send(TransactionEvent::Confirmations {
            id: id.to_string(),
            confirmations,
        });
    }

    /// Move `id` to a terminal state. Returns `false` when it was no longer pending,
    /// so a transaction terminates at most once.
    ///
    /// The receipt is made terminal while the pending entry is still held, so no reader
    /// sees an id that is neither pending nor terminal.
    pub fn resolve(&self, id: &str, resolution: Resolution) -> bool {
        let Entry::Occupied(entry) = self.pending.entry(id.to_string()) else {
            return false;
        };

        let tracked = entry.get().confirmations;
        let receipt = self.receipts.get_mut(id).map(|mut receipt| {
            match &resolution {
                Resolution::Confirmed { confirmations } => {
                    receipt.status = TransactionStatus::Confirmed;
                    receipt.confirmations = (*confirmations).max(tracked);
                }
                Resolution::Failed(reason) => {
                    receipt.status = TransactionStatus::Failed;
                    receipt.confirmations = tracked;
                    receipt.failure = Some(reason.clone());
                }
            }
            receipt.clone()
        });
        entry.remove();

        let Some(receipt) = receipt else {
            warn!(tx_id = %id, "pending transaction had no receipt");
            return true;
        };

        let event = match &resolution {
            Resolution::Confirmed { .. } => {
                info!(tx_id = %id, confirmations = receipt.confirmations, "transaction confirmed");
                TransactionEvent::Confirmed { receipt }
            }
            Resolution::Failed(reason) => {
                warn!(tx_id = %id, code = reason.code(), reason = %reason, "transaction failed");
                TransactionEvent::Failed { receipt }
            }
        };
        let _ = self.events.send(event);
        self.retire(id);
        true
    }

    fn retire(&self, id: &str) {
        let expired: Vec<String> = {
            let mut order = match self.terminal_order.lock() {
                Ok(order) => order,
                Err(poisoned) => poisoned.into_inner(),
            };
            order.push_back(id.to_string());
            let excess = order.len().saturating_sub(self.retention);
            order.drain(..excess).collect()
        };
        for id in expired {
            self.receipts.remove(&id);
            debug!(tx_id = %id, "terminal receipt expired");
        }
    }

    pub fn receipt(&self, id: &str) -> Option<TransactionReceipt> {
        self.receipts.get(id).map(|receipt| receipt.clone())
    }

    /// Wait until `id` reaches a terminal state. `None` for unknown ids.
    pub async fn wait_terminal(&self, id: &str) -> Option<TransactionReceipt> {
        let mut events = self.subscribe();
        loop {
            // Pending is checked before the receipt is read: once an id leaves the
            // pending map its receipt is already terminal, unless tracking was cancelled.
            let pending = self.is_pending(id);
            let current = self.receipt(id)?;
            if current.status.is_terminal() || !pending {
                return Some(current);
            }
            loop {
                match events.recv().await {
                    Ok(event) if event.id() == id => {
                        if let Some(receipt) = event.terminal_receipt() {
                            return Some(receipt.clone());
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return self.receipt(id),
                }
            }
        }
    }

    /// Stop tracking every pending transaction without resolving it.
    pub fn cancel_all(&self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }
}
