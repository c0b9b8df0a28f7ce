use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use ledger::{LedgerConnector, LedgerError};
use shared::error::{ConfirmationFailure, FlowError};
use shared::protocol::Receipt;

/// Lifecycle of one mutating operation. Forward-only per submission;
/// a retry after a terminal state starts a fresh lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperationState {
    Idle,
    Submitting,
    AwaitingConfirmation,
    Succeeded,
    Failed(FlowError),
}

impl PendingOperationState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PendingOperationState::Submitting | PendingOperationState::AwaitingConfirmation
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PendingOperationState::Succeeded | PendingOperationState::Failed(_)
        )
    }
}

/// Owns the submit → confirm lifecycle of one flow instance.
///
/// The single most important property is single-flight: while a
/// submission is in flight a second [`WriteFlow::submit`] is rejected
/// with `AlreadyInProgress` and never reaches the ledger, so a rapid
/// double-click cannot create a duplicate report or a duplicate delete.
pub struct WriteFlow {
    name: &'static str,
    state_tx: watch::Sender<PendingOperationState>,
    // try_lock is the single-flight gate; held across both awaits.
    busy: Mutex<()>,
    confirmation_timeout: Duration,
}

impl WriteFlow {
    pub fn new(name: &'static str, confirmation_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(PendingOperationState::Idle);
        Self {
            name,
            state_tx,
            busy: Mutex::new(()),
            confirmation_timeout,
        }
    }

    pub fn state(&self) -> watch::Receiver<PendingOperationState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> PendingOperationState {
        self.state_tx.borrow().clone()
    }

    /// Consumes a terminal state back to `Idle` (form cleared after
    /// success, error acknowledged after failure). In-flight and idle
    /// states are left untouched.
    pub fn acknowledge(&self) {
        self.state_tx.send_if_modified(|state| {
            if state.is_terminal() {
                *state = PendingOperationState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Runs one complete lifecycle: gate → preconditions → validate →
    /// submit → await finality. Exactly one ledger write on success,
    /// zero on validation failure or unavailability.
    pub async fn submit<F>(
        &self,
        connector: &Arc<dyn LedgerConnector>,
        wallet_connected: bool,
        method: &'static str,
        args_builder: F,
    ) -> Result<Receipt, FlowError>
    where
        F: FnOnce() -> Result<Vec<Value>, FlowError>,
    {
        let Ok(_busy) = self.busy.try_lock() else {
            debug!(flow = self.name, "submit rejected: already in progress");
            return Err(FlowError::AlreadyInProgress);
        };

        // Preconditions fail before the state machine leaves Idle.
        if !wallet_connected {
            return Err(FlowError::OperationUnavailable {
                reason: "wallet is not connected".to_string(),
            });
        }
        if !connector.is_write_ready() {
            return Err(FlowError::OperationUnavailable {
                reason: format!("contract write surface for '{method}' is not resolved"),
            });
        }

        // The builder reads the coalesced snapshot and validates against
        // that same snapshot, so the arguments it returns are exactly
        // what was validated.
        let args = match args_builder() {
            Ok(args) => args,
            Err(err) => {
                self.state_tx
                    .send_replace(PendingOperationState::Failed(err.clone()));
                return Err(err);
            }
        };

        self.state_tx.send_replace(PendingOperationState::Submitting);
        info!(flow = self.name, method, "submitting ledger write");

        let handle = match connector.write(method, &args).await {
            Ok(handle) => handle,
            Err(err) => {
                let err = submission_error(err);
                warn!(flow = self.name, method, error = %err, "submission failed");
                self.state_tx
                    .send_replace(PendingOperationState::Failed(err.clone()));
                return Err(err);
            }
        };

        self.state_tx
            .send_replace(PendingOperationState::AwaitingConfirmation);
        let tx_hash = handle.tx_hash().to_string();
        debug!(flow = self.name, %tx_hash, "awaiting finality");

        let outcome = tokio::time::timeout(self.confirmation_timeout, handle.await_finality()).await;
        let receipt = match outcome {
            Err(_) => {
                let err = FlowError::Confirmation {
                    failure: ConfirmationFailure::Timeout,
                };
                warn!(flow = self.name, %tx_hash, "confirmation timed out");
                self.state_tx
                    .send_replace(PendingOperationState::Failed(err.clone()));
                return Err(err);
            }
            Ok(Err(ledger_err)) => {
                let err = confirmation_error(&ledger_err);
                warn!(flow = self.name, %tx_hash, error = %ledger_err, "confirmation failed");
                self.state_tx
                    .send_replace(PendingOperationState::Failed(err.clone()));
                return Err(err);
            }
            Ok(Ok(receipt)) => receipt,
        };

        info!(
            flow = self.name,
            %tx_hash,
            block = receipt.block_number,
            "write confirmed"
        );
        self.state_tx.send_replace(PendingOperationState::Succeeded);
        Ok(receipt)
    }
}

fn submission_error(err: LedgerError) -> FlowError {
    match err {
        LedgerError::Unavailable { reason } => FlowError::OperationUnavailable { reason },
        other => FlowError::Submission {
            message: other.to_string(),
        },
    }
}

/// An error while awaiting finality means the outcome was either a
/// revert or never observed; in both cases the ledger is authoritative
/// and a re-fetch is still warranted.
fn confirmation_error(err: &LedgerError) -> FlowError {
    match err {
        LedgerError::Reverted { .. } => FlowError::Confirmation {
            failure: ConfirmationFailure::Reverted,
        },
        _ => FlowError::Confirmation {
            failure: ConfirmationFailure::Timeout,
        },
    }
}

#[cfg(test)]
#[path = "tests/flow_tests.rs"]
mod tests;
