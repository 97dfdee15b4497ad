use crate::connectors::LedgerClient;
use crate::error::{CollaboratorError, TransactionError};
use crate::types::{TransactionReceipt, TransactionRequest, TransactionStatus, TransferPayload};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the transfer payload and hands it to the ledger.
///
/// Submission is the point of no return: nothing here retries.
pub struct TransactionSubmitter {
    ledger: Arc<dyn LedgerClient>,
}

impl TransactionSubmitter {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    pub fn build_payload(request: &TransactionRequest, fee: Decimal) -> TransferPayload {
        TransferPayload {
            from: request.sender.clone(),
            to: request.recipient.clone(),
            amount: request.amount,
            fee,
            memo: request.purpose_text().map(str::to_string),
            priority: request.priority,
        }
    }

    pub async fn submit(
        &self,
        request: &TransactionRequest,
        fee: Decimal,
    ) -> Result<TransactionReceipt, TransactionError> {
        let payload = Self::build_payload(request, fee);
        let ack = self.ledger.submit(&payload).await.map_err(|err| {
            warn!(ledger = self.ledger.name(), error = %err, "ledger submission failed");
            match err {
                CollaboratorError::Network(detail) => TransactionError::Network(detail),
                CollaboratorError::Rejected(detail)
                | CollaboratorError::InvalidResponse(detail) => {
                    TransactionError::TransactionFailed(detail)
                }
            }
        })?;

        if ack.id.trim().is_empty() {
            return Err(TransactionError::TransactionFailed(
                "ledger acknowledged submission without an id".to_string(),
            ));
        }

        info!(
            ledger = self.ledger.name(),
            tx_id = %ack.id,
            fee = %ack.fee,
            "transaction submitted"
        );

        Ok(TransactionReceipt {
            id: ack.id,
            sender: payload.from,
            recipient: payload.to,
            amount: payload.amount,
            timestamp: Utc::now(),
            fee: ack.fee,
            status: TransactionStatus::Pending,
            failure: None,
            confirmations: 0,
            risk: None,
        })
    }
}
