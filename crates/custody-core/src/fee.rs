use crate::connectors::FeeOracle;
use crate::types::Priority;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Priority multipliers and the fallback used when the oracle is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    pub low_multiplier: Decimal,
    pub medium_multiplier: Decimal,
    pub high_multiplier: Decimal,
    /// Returned as-is (not scaled) when the oracle fails.
    pub fallback_fee: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            low_multiplier: Decimal::ONE,
            medium_multiplier: Decimal::new(15, 1),
            high_multiplier: Decimal::TWO,
            fallback_fee: Decimal::new(5, 6),
        }
    }
}

impl FeeConfig {
    pub fn multiplier(&self, priority: Priority) -> Decimal {
        match priority {
            Priority::Low => self.low_multiplier,
            Priority::Medium => self.medium_multiplier,
            Priority::High => self.high_multiplier,
        }
    }
}

pub struct FeeEstimator {
    oracle: Arc<dyn FeeOracle>,
    config: FeeConfig,
}

impl FeeEstimator {
    pub fn new(oracle: Arc<dyn FeeOracle>, config: FeeConfig) -> Self {
        Self { oracle, config }
    }

    pub fn config(&self) -> &FeeConfig {
        &self.config
    }

    /// Never fails: oracle errors and nonsensical answers degrade to the fallback fee.
    pub async fn estimate(&self, priority: Priority) -> Decimal {
        match self.oracle.base_fee().await {
            Ok(base) if base >= Decimal::ZERO => {
                match base.checked_mul(self.config.multiplier(priority)) {
                    Some(fee) => {
                        debug!(base_fee = %base, fee = %fee, ?priority, "fee estimated");
                        fee
                    }
                    None => {
                        warn!(base_fee = %base, ?priority, "scaled fee overflows; using fallback");
                        self.config.fallback_fee
                    }
                }
            }
            Ok(base) => {
                warn!(base_fee = %base, "fee oracle returned a negative fee; using fallback");
                self.config.fallback_fee
            }
            Err(err) => {
                warn!(error = %err, "fee oracle unavailable; using fallback");
                self.config.fallback_fee
            }
        }
    }
}
