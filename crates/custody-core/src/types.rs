use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fee tier requested by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// How much risk the wallet owner is willing to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

/// Intent to move value from a custodial wallet.
///
/// Constructed once by the caller and never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    #[serde(default = "Uuid::new_v4")]
    pub trace_id: Uuid,
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal,
    #[serde(default)]
    pub purpose: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    /// Set when the owner has seen a `warn` assessment and wants to send anyway.
    #[serde(default)]
    pub acknowledge_warning: bool,
}

impl TransactionRequest {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: Decimal) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            purpose: None,
            priority: Priority::default(),
            acknowledge_warning: false,
        }
    }

    pub fn with_purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn acknowledging_warning(mut self) -> Self {
        self.acknowledge_warning = true;
        self
    }

    /// Purpose text with surrounding whitespace removed, `None` when blank.
    pub fn purpose_text(&self) -> Option<&str> {
        self.purpose
            .as_deref()
            .map(str::trim)
            .filter(|purpose| !purpose.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Approve,
    Warn,
    Reject,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Approve => "approve",
            Self::Warn => "warn",
            Self::Reject => "reject",
        };
        f.write_str(label)
    }
}

/// Advisory verdict for a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Always within `[0, 1]`.
    pub risk_score: Decimal,
    /// Scored rules that fired, in evaluation order.
    pub factors: Vec<String>,
    /// Unscored observations surfaced alongside the factors.
    pub notes: Vec<String>,
    pub recommendation: Recommendation,
    pub suggested_action: String,
}

impl fmt::Display for RiskAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (risk {})", self.recommendation, self.risk_score)?;
        if !self.factors.is_empty() {
            write!(f, ": {}", self.factors.join("; "))?;
        }
        Ok(())
    }
}

/// Lifecycle state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Why a submitted transaction ended as `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The ledger itself reported the failure.
    Ledger { message: String },
    /// No terminal status was observed within the polling budget.
    Timeout,
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ledger { .. } => "TRANSACTION_FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ledger { message } => write!(f, "ledger reported failure: {message}"),
            Self::Timeout => f.write_str("timed out waiting for a terminal ledger status"),
        }
    }
}

/// Provisional record of a submission, updated in place until terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Ledger-assigned identifier (signature).
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub fee: Decimal,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(default)]
    pub confirmations: u32,
    /// Assessment the send was admitted under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAssessment>,
}

/// Snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: String,
    pub sender: String,
    pub amount: Decimal,
    pub status: TransactionStatus,
    pub confirmations: u32,
    pub created_at: DateTime<Utc>,
}

/// One past transfer out of a wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub recipient: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Read-only snapshot handed to the risk evaluator for one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentContext {
    pub wallet_balance: Decimal,
    #[serde(default)]
    pub recent_transactions: Vec<HistoryEntry>,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
}

impl AgentContext {
    pub fn new(wallet_balance: Decimal) -> Self {
        Self {
            wallet_balance,
            recent_transactions: Vec::new(),
            risk_tolerance: RiskTolerance::default(),
        }
    }

    pub fn with_tolerance(mut self, risk_tolerance: RiskTolerance) -> Self {
        self.risk_tolerance = risk_tolerance;
        self
    }

    pub fn with_history(mut self, entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        self.recent_transactions.extend(entries);
        self
    }

    pub fn has_sent_to(&self, recipient: &str) -> bool {
        self.recent_transactions
            .iter()
            .any(|entry| entry.recipient == recipient)
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.recent_transactions.push(entry);
    }

    /// Total sent within `window` before `now`.
    pub fn spent_since(&self, now: DateTime<Utc>, window: Duration) -> Decimal {
        let cutoff = now - window;
        self.recent_transactions
            .iter()
            .filter(|entry| entry.timestamp > cutoff)
            .map(|entry| entry.amount)
            .sum()
    }
}

/// Answer to a status query for a transaction id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub id: String,
    pub status: TransactionStatus,
    pub confirmations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Full receipt when the transaction was submitted through this pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<TransactionReceipt>,
}

/// Ledger-facing transfer instruction built by the submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPayload {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub fee: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    pub priority: Priority,
}

/// Ledger acknowledgement of an accepted submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub id: String,
    pub fee: Decimal,
}

/// Status answer from the ledger status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending { confirmations: u32 },
    Confirmed { confirmations: u32 },
    Failed { error: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_purpose_is_treated_as_missing() {
        let request = TransactionRequest::new("a", "b", Decimal::ONE).with_purpose("   ");
        assert_eq!(request.purpose_text(), None);

        let request = request.with_purpose(" rent ");
        assert_eq!(request.purpose_text(), Some("rent"));
    }

    #[test]
    fn spent_since_ignores_entries_outside_window() {
        let now = Utc::now();
        let context = AgentContext::new(Decimal::TEN).with_history([
            HistoryEntry {
                recipient: "old".to_string(),
                amount: Decimal::new(5, 0),
                timestamp: now - Duration::hours(30),
            },
            HistoryEntry {
                recipient: "new".to_string(),
                amount: Decimal::new(2, 0),
                timestamp: now - Duration::hours(1),
            },
        ]);

        assert_eq!(
            context.spent_since(now, Duration::hours(24)),
            Decimal::new(2, 0)
        );
        assert!(context.has_sent_to("old"));
        assert!(!context.has_sent_to("stranger"));
    }

    #[test]
    fn request_deserializes_with_defaults() {
        let request: TransactionRequest = serde_json::from_value(serde_json::json!({
            "sender": "a",
            "recipient": "b",
            "amount": "1.5"
        }))
        .expect("request should parse");

        assert_eq!(request.priority, Priority::Medium);
        assert_eq!(request.amount, Decimal::new(15, 1));
        assert!(!request.acknowledge_warning);
    }

    #[test]
    fn ledger_status_uses_tagged_shape() {
        let status: LedgerStatus = serde_json::from_value(serde_json::json!({
            "status": "failed",
            "error": "blockhash expired"
        }))
        .expect("status should parse");

        assert_eq!(
            status,
            LedgerStatus::Failed {
                error: Some("blockhash expired".to_string())
            }
        );
    }
}
