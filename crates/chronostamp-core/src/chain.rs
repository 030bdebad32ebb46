//! Best-effort on-chain receipt verification.
//!
//! After a claim is recorded, the orchestrator can ask a JSON-RPC endpoint
//! for the transaction receipt and check that the transaction exists,
//! succeeded, and targeted the event's contract. This is defense in depth,
//! never a correctness gate: the check runs off the record path with a
//! bounded timeout, and any failure is logged rather than surfaced. The
//! checker is absent entirely when no RPC URL is configured.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Default bound on a receipt fetch.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors from receipt fetching. These are only ever logged.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// The HTTP request failed or timed out.
    #[error("rpc request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The RPC node returned an error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The response body was not a valid receipt payload.
    #[error("malformed rpc response")]
    Malformed,
}

/// Outcome of a best-effort receipt check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptVerdict {
    /// Receipt found, succeeded, and targeted the expected contract.
    Confirmed,
    /// Receipt found but contradicts the recorded claim.
    Mismatch {
        /// What the receipt disagreed on.
        reason: String,
    },
    /// No receipt yet, or the node could not be reached in time.
    Unavailable,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Receipt>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    status: Option<String>,
    to: Option<String>,
    block_number: Option<String>,
}

/// JSON-RPC client for `eth_getTransactionReceipt`.
#[derive(Debug, Clone)]
pub struct ReceiptChecker {
    client: reqwest::Client,
    rpc_url: String,
    timeout: Duration,
}

impl ReceiptChecker {
    /// Creates a checker against `rpc_url` with the given per-request bound.
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url: rpc_url.into(),
            timeout: timeout.unwrap_or(DEFAULT_RECEIPT_TIMEOUT),
        }
    }

    /// Checks the receipt for `transaction_hash` against `expected_contract`.
    ///
    /// Never blocks past the configured timeout. Transport and node errors
    /// collapse into [`ReceiptVerdict::Unavailable`]; only a receipt that
    /// actively contradicts the claim yields [`ReceiptVerdict::Mismatch`].
    pub async fn check(&self, transaction_hash: &str, expected_contract: &str) -> ReceiptVerdict {
        match self.fetch_receipt(transaction_hash).await {
            Ok(Some(receipt)) => Self::judge(&receipt, expected_contract),
            Ok(None) => ReceiptVerdict::Unavailable,
            Err(e) => {
                debug!(error = %e, tx = transaction_hash, "receipt fetch failed");
                ReceiptVerdict::Unavailable
            }
        }
    }

    async fn fetch_receipt(&self, transaction_hash: &str) -> Result<Option<Receipt>, ChainError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [transaction_hash],
        });

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result)
    }

    fn judge(receipt: &Receipt, expected_contract: &str) -> ReceiptVerdict {
        if receipt.block_number.is_none() {
            // Known to the node but not yet mined.
            return ReceiptVerdict::Unavailable;
        }

        match receipt.status.as_deref() {
            Some("0x1") => {}
            Some(other) => {
                return ReceiptVerdict::Mismatch {
                    reason: format!("transaction reverted (status {other})"),
                };
            }
            None => return ReceiptVerdict::Unavailable,
        }

        match &receipt.to {
            Some(to) if to.eq_ignore_ascii_case(expected_contract) => ReceiptVerdict::Confirmed,
            Some(to) => ReceiptVerdict::Mismatch {
                reason: format!("transaction targeted {to}, expected {expected_contract}"),
            },
            None => ReceiptVerdict::Mismatch {
                reason: "transaction has no target address".to_string(),
            },
        }
    }
}
