use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Proof of finality for a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub confirmed_at: DateTime<Utc>,
}

/// `POST /call` — side-effect-free contract read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRequest {
    pub contract: String,
    pub method: String,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub value: serde_json::Value,
}

/// `POST /send` — signed contract write; the gateway answers with the
/// transaction hash once the node accepts the submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRequest {
    pub contract: String,
    pub method: String,
    pub args: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendResponse {
    pub tx_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPhase {
    Pending,
    Confirmed,
    Reverted,
}

/// `GET /tx/{hash}` — transaction lifecycle as the gateway sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxStatusResponse {
    pub tx_hash: String,
    pub phase: TxPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}
