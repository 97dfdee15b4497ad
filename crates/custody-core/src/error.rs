use crate::types::RiskAssessment;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by an external collaborator (balance provider, fee oracle, ledger,
/// history store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// Transport-level or transient failure; the call may succeed if repeated.
    #[error("network failure: {0}")]
    Network(String),

    /// The collaborator understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The collaborator answered with a payload that failed boundary validation.
    #[error("malformed response: {0}")]
    InvalidResponse(String),
}

/// How loudly a failure should be presented to the wallet owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Synchronous failures of `TransactionManager::send_transaction`.
///
/// Post-submission failures (ledger-side failure, timeout) never surface here; they are
/// observed through the pending registry and the receipt status.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid recipient address '{0}'")]
    InvalidAddress(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Transaction rejected by risk engine: {0}")]
    RejectedByRisk(Box<RiskAssessment>),

    #[error("Risk warning must be acknowledged before sending: {0}")]
    ConfirmationRequired(Box<RiskAssessment>),

    #[error("Ledger rejected transaction: {0}")]
    TransactionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction '{0}' is already tracked")]
    DuplicateTransaction(String),
}

impl TransactionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::RejectedByRisk(_) => "RISK_REJECTED",
            Self::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            Self::TransactionFailed(_) => "TRANSACTION_FAILED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidAddress(_) | Self::Validation(_) => Severity::Low,
            Self::InsufficientBalance { .. }
            | Self::ConfirmationRequired(_)
            | Self::Network(_) => Severity::Medium,
            Self::RejectedByRisk(_) | Self::TransactionFailed(_) => Severity::High,
            Self::DuplicateTransaction(_) => Severity::Critical,
        }
    }

    /// User-facing next step for the failure.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "Check the recipient address and try again.",
            Self::Validation(_) => "Adjust the amount and try again.",
            Self::InsufficientBalance { .. } => "Please add funds to your wallet and try again.",
            Self::RejectedByRisk(_) => {
                "Review the risk factors; reduce the amount or send to a known recipient."
            }
            Self::ConfirmationRequired(_) => {
                "Review the risk factors and resend with the warning acknowledged."
            }
            Self::TransactionFailed(_) => {
                "Please try again or check the transaction status on the ledger explorer."
            }
            Self::Network(_) => "Check your connection and try again.",
            Self::DuplicateTransaction(_) => "Please contact support immediately.",
        }
    }

    /// Risk assessment attached to risk-gated failures.
    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            Self::RejectedByRisk(assessment) | Self::ConfirmationRequired(assessment) => {
                Some(assessment)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            TransactionError::InvalidAddress("abc".to_string()).code(),
            "INVALID_ADDRESS"
        );
        assert_eq!(
            TransactionError::InsufficientBalance {
                requested: Decimal::TEN,
                available: Decimal::ONE,
            }
            .code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(
            TransactionError::Network("down".to_string()).severity(),
            Severity::Medium
        );
    }

    #[test]
    fn insufficient_balance_message_carries_amounts() {
        let err = TransactionError::InsufficientBalance {
            requested: Decimal::new(12, 0),
            available: Decimal::new(10, 0),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: requested 12, available 10"
        );
    }
}
