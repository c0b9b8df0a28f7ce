//! The external ledger boundary: an authoritative, slow, fallible,
//! eventually-consistent store reached only through `read`/`write` calls.
//!
//! Nothing in this crate knows about flows or form state; it exposes the
//! collaborator surface the orchestration layer is written against, plus
//! an HTTP gateway implementation of that surface.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use shared::protocol::Receipt;

mod http;
pub use http::{HttpLedgerConnector, HttpLedgerOptions};

/// Registry contract methods the client consumes.
pub mod methods {
    pub const GET_REPORT_LENGTH: &str = "getDisasterReportLength";
    pub const GET_REPORT: &str = "getDisasterReport";
    pub const GET_IMAGES: &str = "getDisasterImages";
    pub const CREATE_REPORT: &str = "createDisasterReport";
    pub const DELETE_REPORT: &str = "deleteDisasterReport";
    pub const ADD_IMAGE: &str = "addDisasterImage";
    pub const DELETE_IMAGE: &str = "deleteDisasterImage";
}

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The write surface for a method is not resolved (no wallet, no
    /// contract binding).
    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },

    /// The node or signer rejected the submission. No ledger effect.
    #[error("submission rejected: {message}")]
    Submission { message: String },

    /// The transaction was mined but reverted.
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The gateway does not know the requested entity. Read paths treat
    /// this as absence, not as a failure.
    #[error("entity not found")]
    NotFound,

    /// Transport failure on either path.
    #[error("ledger transport error: {message}")]
    Transport { message: String },
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport {
            message: err.to_string(),
        }
    }
}

/// Ephemeral handle for one submitted write. Owned exclusively by the
/// submitting flow; never persisted. Consuming it is the only way to
/// learn the outcome.
#[async_trait]
pub trait TransactionHandle: Send {
    /// Blocks until the ledger accepts or rejects the transaction.
    async fn await_finality(self: Box<Self>) -> Result<Receipt, LedgerError>;

    fn tx_hash(&self) -> &str;
}

/// The read/write boundary to the registry contract.
///
/// `read` is idempotent, side-effect free, and may return stale data
/// relative to a just-confirmed write. `write` has ledger side effects
/// and yields a [`TransactionHandle`] once the node accepts it.
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn read(&self, method: &str, args: &[Value]) -> Result<Value, LedgerError>;

    async fn write(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Box<dyn TransactionHandle>, LedgerError>;

    /// Whether the write surface is currently usable. Checked before a
    /// flow leaves `Idle` so that unavailability fails fast.
    fn is_write_ready(&self) -> bool {
        true
    }
}

/// Connector used before any real binding exists; every call fails with
/// `Unavailable` and nothing leaves the client.
pub struct MissingLedgerConnector;

#[async_trait]
impl LedgerConnector for MissingLedgerConnector {
    async fn read(&self, method: &str, _args: &[Value]) -> Result<Value, LedgerError> {
        Err(LedgerError::Unavailable {
            reason: format!("no ledger connector bound for read '{method}'"),
        })
    }

    async fn write(
        &self,
        method: &str,
        _args: &[Value],
    ) -> Result<Box<dyn TransactionHandle>, LedgerError> {
        Err(LedgerError::Unavailable {
            reason: format!("no ledger connector bound for write '{method}'"),
        })
    }

    fn is_write_ready(&self) -> bool {
        false
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
