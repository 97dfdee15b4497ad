//! Risk-gated transaction pipeline for custodial wallets.
//!
//! A send is validated, scored by a deterministic risk engine, priced, submitted to an
//! external ledger and then tracked in the background until the ledger reports a
//! terminal status or the polling budget runs out.

#![deny(unsafe_code)]

pub mod address;
pub mod connectors;
pub mod error;
pub mod fee;
pub mod history;
pub mod manager;
pub mod poller;
pub mod registry;
pub mod risk;
pub mod submitter;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{AddressValidator, Base58AddressValidator};
pub use connectors::{BalanceProvider, Collaborators, FeeOracle, LedgerClient};
pub use error::{CollaboratorError, Severity, TransactionError};
pub use fee::{FeeConfig, FeeEstimator};
pub use history::{ChainedEntry, HistoryStore, InMemoryHistoryStore};
pub use manager::{AmountLimits, PipelineConfig, TransactionManager, WarnPolicy};
pub use poller::{PollOutcome, PollerConfig, StatusPoller};
pub use registry::{CancellationSignal, PendingTransactionRegistry, Resolution, TransactionEvent};
pub use risk::{RiskEngineConfig, RiskEvaluator};
pub use submitter::TransactionSubmitter;
pub use types::{
    AgentContext, FailureReason, HistoryEntry, LedgerStatus, PendingTransaction, Priority,
    Recommendation, RiskAssessment, RiskTolerance, StatusReport, SubmitAck, TransactionReceipt,
    TransactionRequest, TransactionStatus, TransferPayload,
};
