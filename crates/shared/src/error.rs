use std::fmt;

use thiserror::Error;

/// Why a transaction failed to reach finality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationFailure {
    Reverted,
    Timeout,
}

impl ConfirmationFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConfirmationFailure::Timeout)
    }
}

impl fmt::Display for ConfirmationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationFailure::Reverted => f.write_str("reverted"),
            ConfirmationFailure::Timeout => f.write_str("timed out"),
        }
    }
}

/// Client-side outcome taxonomy for one mutating flow.
///
/// Every variant except `AlreadyInProgress` is surfaced to the caller as
/// a single human-readable line; transport detail goes to tracing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowError {
    /// Incomplete form. Recovered locally, no ledger interaction.
    #[error("please fill all fields (missing: {field})")]
    Validation { field: &'static str },

    /// Wallet disconnected or the contract write surface is not resolved.
    #[error("operation unavailable: {reason}")]
    OperationUnavailable { reason: String },

    /// Rejected signature or node error while submitting. No ledger effect.
    #[error("transaction submission failed: {message}")]
    Submission { message: String },

    /// The transaction was accepted but never reached successful finality.
    /// Ledger state is authoritative and may still have changed, so a
    /// re-fetch is warranted before telling the user nothing happened.
    #[error("transaction confirmation failed ({failure})")]
    Confirmation { failure: ConfirmationFailure },

    /// A second submit while the first is in flight. Silently dropped by
    /// the view model; never shown as an error.
    #[error("a submission is already in progress")]
    AlreadyInProgress,

    /// Transport failure on the read path.
    #[error("ledger read failed: {message}")]
    Read { message: String },
}

impl FlowError {
    /// Whether the view model should surface this error to the user.
    pub fn is_surfaced(&self) -> bool {
        !matches!(self, FlowError::AlreadyInProgress)
    }

    /// Whether a re-fetch of the affected identity is still warranted
    /// even though the flow failed.
    pub fn warrants_refetch(&self) -> bool {
        matches!(self, FlowError::Confirmation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_in_progress_is_never_surfaced() {
        assert!(!FlowError::AlreadyInProgress.is_surfaced());
        assert!(FlowError::Validation { field: "email" }.is_surfaced());
    }

    #[test]
    fn confirmation_failures_still_warrant_a_refetch() {
        let err = FlowError::Confirmation {
            failure: ConfirmationFailure::Reverted,
        };
        assert!(err.warrants_refetch());
        assert!(!FlowError::AlreadyInProgress.warrants_refetch());
    }

    #[test]
    fn messages_are_single_human_readable_lines() {
        let timeout = FlowError::Confirmation {
            failure: ConfirmationFailure::Timeout,
        };
        assert_eq!(
            timeout.to_string(),
            "transaction confirmation failed (timed out)"
        );
        assert!(!FlowError::Validation { field: "city" }
            .to_string()
            .contains('\n'));
    }
}
