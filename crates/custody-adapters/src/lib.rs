//! Collaborator adapters for the custody pipeline.

#![deny(unsafe_code)]

pub mod http;
pub mod simulated;

pub use http::{GatewayError, HttpGateway};
pub use simulated::SimulatedLedger;

use async_trait::async_trait;
use custody_core::connectors::FeeOracle;
use custody_core::error::CollaboratorError;
use rust_decimal::Decimal;

/// Fee oracle that is never reachable, for exercising the fallback path.
#[derive(Debug, Clone)]
pub struct UnreachableFeeOracle {
    reason: String,
}

impl UnreachableFeeOracle {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl FeeOracle for UnreachableFeeOracle {
    async fn base_fee(&self) -> Result<Decimal, CollaboratorError> {
        Err(CollaboratorError::Network(self.reason.clone()))
    }
}
