use crate::connectors::LedgerClient;
use crate::registry::{CancellationSignal, PendingTransactionRegistry, Resolution};
use crate::types::{FailureReason, LedgerStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info_span, warn, Instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_ms: u64,
    /// Total budget per transaction, measured from registration.
    pub timeout_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            timeout_ms: 60_000,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// How a poller task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Confirmed,
    Failed,
    TimedOut,
    /// The registry entry disappeared before this poller resolved it.
    Cancelled,
}

/// Drives one pending transaction to a terminal state per spawned task.
#[derive(Clone)]
pub struct StatusPoller {
    ledger: Arc<dyn LedgerClient>,
    registry: Arc<PendingTransactionRegistry>,
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        registry: Arc<PendingTransactionRegistry>,
        config: PollerConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            config,
        }
    }

    pub fn spawn(&self, id: String, cancel: CancellationSignal) -> JoinHandle<PollOutcome> {
        let poller = self.clone();
        let span = info_span!("status_poller", tx_id = %id);
        tokio::spawn(async move { poller.track(id, cancel).await }.instrument(span))
    }

    /// Poll until the ledger reports a terminal status, the budget runs out, or the
    /// registry entry is removed.
    pub async fn track(self, id: String, mut cancel: CancellationSignal) -> PollOutcome {
        let started = Instant::now();
        let deadline = started + self.config.timeout();
        let mut ticks = interval_at(started + self.config.interval(), self.config.interval());
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(attempts, "registry entry removed; polling stopped");
                    return PollOutcome::Cancelled;
                }
                _ = sleep_until(deadline) => return self.time_out(&id, attempts),
                _ = ticks.tick() => {}
            }

            attempts += 1;
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                polled = timeout_at(deadline, self.ledger.status(&id)) => polled,
            };
            let Ok(result) = polled else {
                return self.time_out(&id, attempts);
            };

            match result {
                Ok(LedgerStatus::Pending { confirmations }) => {
                    debug!(attempts, confirmations, "still pending");
                    self.registry.record_confirmations(&id, confirmations);
                }
                Ok(LedgerStatus::Confirmed { confirmations }) => {
                    return self.finish(
                        &id,
                        Resolution::Confirmed { confirmations },
                        PollOutcome::Confirmed,
                    );
                }
                Ok(LedgerStatus::Failed { error }) => {
                    let message = error
                        .unwrap_or_else(|| "ledger reported failure without detail".to_string());
                    return self.finish(
                        &id,
                        Resolution::Failed(FailureReason::Ledger { message }),
                        PollOutcome::Failed,
                    );
                }
                Err(err) => {
                    warn!(attempts, error = %err, "status poll failed; retrying next tick");
                }
            }
        }
    }

    fn time_out(&self, id: &str, attempts: u32) -> PollOutcome {
        warn!(
            attempts,
            timeout_ms = self.config.timeout_ms,
            "no terminal status before deadline"
        );
        self.finish(id, Resolution::Failed(FailureReason::Timeout), PollOutcome::TimedOut)
    }

    fn finish(&self, id: &str, resolution: Resolution, outcome: PollOutcome) -> PollOutcome {
        if self.registry.resolve(id, resolution) {
            outcome
        } else {
            PollOutcome::Cancelled
        }
    }
}
