use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use shared::protocol::{
    CallRequest, CallResponse, Receipt, SendRequest, SendResponse, TxPhase, TxStatusResponse,
};

use crate::{LedgerConnector, LedgerError, TransactionHandle};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct HttpLedgerOptions {
    pub gateway_url: String,
    pub contract_address: String,
    pub poll_interval: Duration,
}

impl HttpLedgerOptions {
    pub fn new(gateway_url: impl Into<String>, contract_address: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            contract_address: contract_address.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// [`LedgerConnector`] over a JSON gateway in front of the node:
/// `POST /call` for reads, `POST /send` for writes, `GET /tx/{hash}`
/// polled until the transaction is confirmed or reverted.
pub struct HttpLedgerConnector {
    http: Client,
    gateway_url: String,
    contract_address: String,
    poll_interval: Duration,
}

impl HttpLedgerConnector {
    pub fn new(options: HttpLedgerOptions) -> Self {
        Self {
            http: Client::new(),
            gateway_url: options.gateway_url.trim_end_matches('/').to_string(),
            contract_address: options.contract_address,
            poll_interval: options.poll_interval,
        }
    }
}

#[async_trait]
impl LedgerConnector for HttpLedgerConnector {
    async fn read(&self, method: &str, args: &[Value]) -> Result<Value, LedgerError> {
        let response = self
            .http
            .post(format!("{}/call", self.gateway_url))
            .json(&CallRequest {
                contract: self.contract_address.clone(),
                method: method.to_string(),
                args: args.to_vec(),
            })
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::NotFound);
        }
        let response = response.error_for_status()?;
        let body: CallResponse = response.json().await?;
        debug!(method, "ledger read completed");
        Ok(body.value)
    }

    async fn write(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Box<dyn TransactionHandle>, LedgerError> {
        let response = self
            .http
            .post(format!("{}/send", self.gateway_url))
            .json(&SendRequest {
                contract: self.contract_address.clone(),
                method: method.to_string(),
                args: args.to_vec(),
            })
            .send()
            .await
            .map_err(|err| LedgerError::Submission {
                message: err.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Submission {
                message: format!("gateway returned {status}: {message}"),
            });
        }

        let body: SendResponse = response.json().await.map_err(|err| LedgerError::Submission {
            message: err.to_string(),
        })?;
        debug!(method, tx_hash = %body.tx_hash, "write submitted");

        Ok(Box::new(HttpTransactionHandle {
            http: self.http.clone(),
            gateway_url: self.gateway_url.clone(),
            tx_hash: body.tx_hash,
            poll_interval: self.poll_interval,
        }))
    }
}

struct HttpTransactionHandle {
    http: Client,
    gateway_url: String,
    tx_hash: String,
    poll_interval: Duration,
}

#[async_trait]
impl TransactionHandle for HttpTransactionHandle {
    /// Polls the gateway until the transaction leaves the pending phase.
    /// The confirmation timeout is the caller's concern; this loop only
    /// ends on finality or transport failure.
    async fn await_finality(self: Box<Self>) -> Result<Receipt, LedgerError> {
        loop {
            let response = self
                .http
                .get(format!("{}/tx/{}", self.gateway_url, self.tx_hash))
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                // The gateway may not have indexed the hash yet.
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let status: TxStatusResponse = response.error_for_status()?.json().await?;
            match status.phase {
                TxPhase::Pending => tokio::time::sleep(self.poll_interval).await,
                TxPhase::Confirmed => {
                    return Ok(Receipt {
                        tx_hash: status.tx_hash,
                        block_number: status.block_number.unwrap_or_default(),
                        confirmed_at: status.confirmed_at.unwrap_or_else(chrono::Utc::now),
                    });
                }
                TxPhase::Reverted => {
                    let reason = status
                        .revert_reason
                        .unwrap_or_else(|| "no revert reason given".to_string());
                    warn!(tx_hash = %status.tx_hash, %reason, "transaction reverted");
                    return Err(LedgerError::Reverted { reason });
                }
            }
        }
    }

    fn tx_hash(&self) -> &str {
        &self.tx_hash
    }
}
