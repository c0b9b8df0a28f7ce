use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use ledger::{methods, LedgerConnector, LedgerError};
use shared::domain::{DisasterImage, Report, ReportId};
use shared::error::FlowError;

pub(crate) const VISIBILITY_RETRY_ATTEMPTS: u32 = 3;
pub(crate) const VISIBILITY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Pure read-through against the ledger. No local write path, no cache:
/// every call asks the registry, which may lag a just-confirmed write.
pub struct ReadSynchronizer {
    connector: Arc<dyn LedgerConnector>,
}

impl ReadSynchronizer {
    pub fn new(connector: Arc<dyn LedgerConnector>) -> Self {
        Self { connector }
    }

    /// Number of report slots the registry has ever assigned.
    pub async fn report_count(&self) -> Result<u64, FlowError> {
        let value = self
            .connector
            .read(methods::GET_REPORT_LENGTH, &[])
            .await
            .map_err(read_error)?;
        value
            .as_u64()
            .ok_or_else(|| FlowError::Read {
                message: format!("report length is not an unsigned integer: {value}"),
            })
    }

    /// `None` means the identity does not exist (or its slot was
    /// cleared); only transport failures are errors.
    pub async fn fetch(&self, id: ReportId) -> Result<Option<Report>, FlowError> {
        let value = match self
            .connector
            .read(methods::GET_REPORT, &[json!(id.0)])
            .await
        {
            Ok(value) => value,
            Err(err) if is_not_found(&err) => return Ok(None),
            Err(err) => return Err(read_error(err)),
        };
        if value.is_null() {
            return Ok(None);
        }
        Report::from_ledger_tuple(&value).map_err(|message| FlowError::Read { message })
    }

    /// Images in insertion order, which is also display order. Empty for
    /// an unknown identity, never an error.
    pub async fn fetch_images(&self, id: ReportId) -> Result<Vec<DisasterImage>, FlowError> {
        let value = match self
            .connector
            .read(methods::GET_IMAGES, &[json!(id.0)])
            .await
        {
            Ok(value) => value,
            Err(err) if is_not_found(&err) => return Ok(Vec::new()),
            Err(err) => return Err(read_error(err)),
        };
        if value.is_null() {
            return Ok(Vec::new());
        }
        let tuples = value.as_array().ok_or_else(|| FlowError::Read {
            message: format!("expected array of image tuples, got {value}"),
        })?;
        tuples
            .iter()
            .map(|tuple| {
                DisasterImage::from_ledger_tuple(tuple)
                    .map_err(|message| FlowError::Read { message })
            })
            .collect()
    }

    /// Re-reads a report after its create was confirmed, tolerating the
    /// registry still serving the pre-write state. A transient `None`
    /// after a reported success means "not yet visible", not an error;
    /// retries are bounded and exhaustion is a staleness warning.
    pub async fn await_report_visible(&self, id: ReportId) -> Result<Option<Report>, FlowError> {
        for attempt in 1..=VISIBILITY_RETRY_ATTEMPTS {
            if let Some(report) = self.fetch(id).await? {
                debug!(%id, attempt, "report visible");
                return Ok(Some(report));
            }
            if attempt < VISIBILITY_RETRY_ATTEMPTS {
                tokio::time::sleep(VISIBILITY_RETRY_DELAY * attempt).await;
            }
        }
        warn!(%id, "report still not visible after confirmed write; registry may be lagging");
        Ok(None)
    }

    /// Same staleness tolerance for the registry length after a create.
    pub async fn await_count_at_least(&self, expected: u64) -> Result<u64, FlowError> {
        let mut count = 0;
        for attempt in 1..=VISIBILITY_RETRY_ATTEMPTS {
            count = self.report_count().await?;
            if count >= expected {
                return Ok(count);
            }
            if attempt < VISIBILITY_RETRY_ATTEMPTS {
                tokio::time::sleep(VISIBILITY_RETRY_DELAY * attempt).await;
            }
        }
        warn!(
            expected,
            observed = count,
            "report count still stale after confirmed create"
        );
        Ok(count)
    }
}

fn read_error(err: LedgerError) -> FlowError {
    FlowError::Read {
        message: err.to_string(),
    }
}

// Gateways differ on whether an unknown id is a null value or an
// explicit not-found; treat both as absence.
fn is_not_found(err: &LedgerError) -> bool {
    matches!(err, LedgerError::NotFound)
}

#[cfg(test)]
#[path = "tests/sync_tests.rs"]
mod tests;
