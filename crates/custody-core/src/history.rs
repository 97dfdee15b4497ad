use crate::error::CollaboratorError;
use crate::types::HistoryEntry;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Append-only per-wallet log of past transfers.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, wallet: &str, entry: HistoryEntry) -> Result<(), CollaboratorError>;

    /// Up to `limit` most recent entries, oldest first.
    async fn recent(&self, wallet: &str, limit: usize)
        -> Result<Vec<HistoryEntry>, CollaboratorError>;
}

/// Stored history entry with its hash-chain link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainedEntry {
    pub index: u64,
    pub entry: HistoryEntry,
    pub previous_hash: Option<String>,
    pub entry_hash: String,
}

/// In-process history store; each wallet's log is a blake3 hash chain.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    wallets: DashMap<String, Vec<ChainedEntry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, wallet: &str) -> Vec<ChainedEntry> {
        self.wallets
            .get(wallet)
            .map(|chain| chain.clone())
            .unwrap_or_default()
    }

    pub fn verify_chain(&self, wallet: &str) -> bool {
        let Some(chain) = self.wallets.get(wallet) else {
            return true;
        };
        verify_entries(wallet, &chain)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, wallet: &str, entry: HistoryEntry) -> Result<(), CollaboratorError> {
        let mut chain = self.wallets.entry(wallet.to_string()).or_default();
        let index = chain.len() as u64;
        let previous_hash = chain.last().map(|last| last.entry_hash.clone());
        let entry_hash = compute_entry_hash(wallet, index, &entry, previous_hash.as_deref());
        chain.push(ChainedEntry {
            index,
            entry,
            previous_hash,
            entry_hash,
        });
        Ok(())
    }

    async fn recent(
        &self,
        wallet: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, CollaboratorError> {
        let Some(chain) = self.wallets.get(wallet) else {
            return Ok(Vec::new());
        };
        let skip = chain.len().saturating_sub(limit);
        Ok(chain.iter().skip(skip).map(|c| c.entry.clone()).collect())
    }
}

fn verify_entries(wallet: &str, chain: &[ChainedEntry]) -> bool {
    let mut previous_hash: Option<String> = None;
    for (position, stored) in chain.iter().enumerate() {
        if stored.index != position as u64 || stored.previous_hash != previous_hash {
            return false;
        }
        let expected = compute_entry_hash(
            wallet,
            stored.index,
            &stored.entry,
            previous_hash.as_deref(),
        );
        if stored.entry_hash != expected {
            return false;
        }
        previous_hash = Some(stored.entry_hash.clone());
    }
    true
}

fn compute_entry_hash(
    wallet: &str,
    index: u64,
    entry: &HistoryEntry,
    previous_hash: Option<&str>,
) -> String {
    let material = serde_json::json!({
        "wallet": wallet,
        "index": index,
        "recipient": entry.recipient,
        "amount": entry.amount,
        "timestamp": entry.timestamp,
        "previous_hash": previous_hash,
    });
    let bytes = serde_json::to_vec(&material).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn entry(recipient: &str, amount: i64) -> HistoryEntry {
        HistoryEntry {
            recipient: recipient.to_string(),
            amount: Decimal::new(amount, 0),
            timestamp: Utc::now() + Duration::seconds(amount),
        }
    }

    #[tokio::test]
    async fn recent_returns_tail_in_insertion_order() {
        let store = InMemoryHistoryStore::new();
        for n in 1..=5 {
            store.append("w", entry("r", n)).await.unwrap();
        }

        let recent = store.recent("w", 2).await.unwrap();
        let amounts: Vec<_> = recent.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![Decimal::new(4, 0), Decimal::new(5, 0)]);
        assert!(store.recent("other", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verifies_hash_chain() {
        let store = InMemoryHistoryStore::new();
        store.append("w", entry("a", 1)).await.unwrap();
        store.append("w", entry("b", 2)).await.unwrap();

        assert!(store.verify_chain("w"));
        let entries = store.entries("w");
        assert_eq!(entries[1].previous_hash.as_ref(), Some(&entries[0].entry_hash));
    }

    #[tokio::test]
    async fn detects_tampered_entries() {
        let store = InMemoryHistoryStore::new();
        store.append("w", entry("a", 1)).await.unwrap();
        store.append("w", entry("b", 2)).await.unwrap();

        if let Some(mut chain) = store.wallets.get_mut("w") {
            chain[0].entry.amount = Decimal::new(1000, 0);
        }
        assert!(!store.verify_chain("w"));
    }
}
