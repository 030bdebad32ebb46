//! Claim orchestration: the authorize, record, and query flows.
//!
//! The orchestrator ties the signer and ledger together around one
//! correctness property: **at most one claim per `(user, event)` pair**.
//!
//! The authorize flow is read-mostly. It walks a chain of gates (input
//! syntax, event existence, prior claim, supply, contract deployment,
//! claim window, signer health) and, only once every gate passes, issues a
//! signed `(nonce, signature)` authorization. Nothing is persisted, so a
//! user can retry authorization freely after a dropped wallet popup
//! without corrupting supply counts.
//!
//! The record flow runs after the caller's wallet has confirmed the mint
//! on-chain. It re-checks duplicate state for a friendly error, then lets
//! the ledger's uniqueness constraint arbitrate: the claim insert and the
//! guarded supply increment commit in one transaction, and a constraint
//! violation from a racing call surfaces as the same `AlreadyRecorded`
//! outcome. Best-effort receipt verification runs as a spawned side task
//! and can only ever produce log output.

mod error;

#[cfg(test)]
mod tests;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use error::ClaimError;

use crate::chain::{ReceiptChecker, ReceiptVerdict};
use crate::ledger::{ClaimLedger, ClaimRecord, EventRecord, NewClaim};
use crate::signer::{self, SignerService};

/// Request to authorize a claim for an event code.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    /// Organizer-chosen join code; matched case-insensitively.
    pub event_code: String,
    /// The claiming wallet address.
    pub user_address: String,
}

/// Display metadata for the claimed event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    /// Event display name.
    pub name: String,
    /// Event description.
    pub description: String,
    /// Stamp artwork URL.
    pub image_url: String,
    /// Human-readable event date.
    pub event_date: String,
    /// Organizer display name.
    pub organizer: String,
}

/// A signed mint authorization, returned to the caller.
///
/// Ephemeral: nothing here is persisted server-side. Replay protection is
/// the contract's consumed-nonce set on-chain and the claim ledger's
/// uniqueness key off-chain.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAuthorization {
    /// The event's on-chain contract to submit the claim to.
    pub contract_address: String,
    /// 65-byte ECDSA signature, `0x`-prefixed hex.
    pub signature: String,
    /// Fresh 32-byte nonce bound into the signature, `0x`-prefixed hex.
    pub nonce: String,
    /// The claiming address in EIP-55 checksum form.
    pub user_address: String,
    /// The event code, uppercased.
    pub event_code: String,
    /// Event display name.
    pub event_name: String,
    /// The event's ledger id, echoed for the later record call.
    pub event_id: i64,
    /// Display metadata for rendering the pending stamp.
    pub event_data: EventData,
}

/// Request to record a confirmed on-chain mint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    /// The claimed event's ledger id.
    pub event_id: i64,
    /// The claiming wallet address.
    pub user_address: String,
    /// Hash of the confirmed mint transaction.
    pub transaction_hash: String,
    /// Token id minted by the contract.
    pub token_id: String,
    /// Block number, echoed back for display only.
    #[serde(default)]
    pub block_number: Option<u64>,
    /// Gas used, echoed back for display only.
    #[serde(default)]
    pub gas_used: Option<u64>,
}

/// Display projection of a claim joined with its event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamp {
    /// Claim sequence number.
    pub id: i64,
    /// Token id minted on-chain.
    pub token_id: String,
    /// Event display name.
    pub event_name: String,
    /// Event description.
    pub description: String,
    /// Stamp artwork URL.
    pub image_url: String,
    /// The event's on-chain contract address, if deployed.
    pub contract_address: Option<String>,
    /// When the claim was recorded (unix seconds).
    pub claimed_at: i64,
    /// Human-readable event date.
    pub event_date: String,
    /// Organizer display name.
    pub organizer: String,
}

/// Transaction metadata echoed back from a record call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    /// Transaction hash.
    pub hash: String,
    /// Block number, if the caller supplied one.
    pub block_number: Option<u64>,
    /// Gas used, if the caller supplied it.
    pub gas_used: Option<u64>,
}

/// Result of a successful record call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedClaim {
    /// The newly materialized stamp.
    pub stamp: Stamp,
    /// Echoed transaction metadata.
    pub transaction: TransactionInfo,
}

/// The claim orchestrator.
///
/// All collaborators are injected at construction; there is no global
/// state. Cloning shares the underlying ledger connection and signer.
pub struct ClaimOrchestrator {
    ledger: ClaimLedger,
    signer: SignerService,
    receipt_checker: Option<ReceiptChecker>,
}

impl ClaimOrchestrator {
    /// Creates an orchestrator over the given ledger and signer.
    ///
    /// Pass a [`ReceiptChecker`] to enable best-effort on-chain
    /// verification of recorded claims; `None` disables it.
    #[must_use]
    pub fn new(
        ledger: ClaimLedger,
        signer: SignerService,
        receipt_checker: Option<ReceiptChecker>,
    ) -> Self {
        Self {
            ledger,
            signer,
            receipt_checker,
        }
    }

    /// Returns the underlying ledger, for organizer-facing event creation.
    #[must_use]
    pub const fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    /// Returns the signer, for startup and health checks.
    #[must_use]
    pub const fn signer(&self) -> &SignerService {
        &self.signer
    }

    /// Authorizes a claim: validates every gate, then signs.
    ///
    /// Read-mostly; mutates neither ledger. Gates short-circuit in order,
    /// so the first failing condition determines the error.
    ///
    /// # Errors
    ///
    /// See [`ClaimError`] for the full taxonomy; every gate failure is
    /// terminal for this request and retries are the caller's decision.
    pub fn authorize(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<ClaimAuthorization, ClaimError> {
        if request.event_code.trim().is_empty() {
            return Err(ClaimError::InvalidInput {
                reason: "event code is required".to_string(),
            });
        }
        let user_address = signer::normalize_address(&request.user_address).map_err(|_| {
            ClaimError::InvalidInput {
                reason: "user address is not a valid account address".to_string(),
            }
        })?;

        let event = self
            .ledger
            .event_by_code(&request.event_code)?
            .ok_or(ClaimError::EventNotFound)?;

        if self.ledger.find_claim(event.id, &user_address)?.is_some() {
            return Err(ClaimError::AlreadyClaimed);
        }

        if let Some(max_supply) = event.max_supply {
            if event.total_claimed >= max_supply {
                return Err(ClaimError::SoldOut);
            }
        }

        let Some(contract_address) = event.contract_address.clone() else {
            return Err(ClaimError::ContractNotDeployed);
        };

        check_claim_window(&event)?;

        // A signer whose key does not derive the expected address would
        // issue authorizations the contract rejects; fail here instead.
        if let Err(e) = self.signer.validate_config() {
            warn!(error = %e, "signer health gate failed");
            return Err(ClaimError::ServerMisconfigured);
        }

        let nonce = self.signer.generate_nonce();
        let signature = self
            .signer
            .sign_claim(&user_address, &nonce)
            .map_err(|e| {
                warn!(error = %e, "signing failed");
                ClaimError::ServerMisconfigured
            })?;

        info!(
            event_id = event.id,
            event_code = %event.event_code,
            "claim authorization issued"
        );

        Ok(ClaimAuthorization {
            contract_address,
            signature: signature.to_hex(),
            nonce,
            user_address,
            event_code: event.event_code.clone(),
            event_name: event.name.clone(),
            event_id: event.id,
            event_data: event_data(&event),
        })
    }

    /// Records a confirmed on-chain mint exactly once.
    ///
    /// The duplicate pre-check here is a fast-fail courtesy; the ledger's
    /// uniqueness constraint inside [`ClaimLedger::record_claim`] is the
    /// enforcement authority, so two racing calls for the same pair
    /// resolve to one success and one [`ClaimError::AlreadyRecorded`].
    ///
    /// # Errors
    ///
    /// See [`ClaimError`]. Receipt verification failures are never one of
    /// them: the mint already happened on-chain, and refusing to record it
    /// would strand the user's NFT from the off-chain ledger.
    pub fn record(&self, request: &RecordRequest) -> Result<RecordedClaim, ClaimError> {
        if request.transaction_hash.trim().is_empty() || request.token_id.trim().is_empty() {
            return Err(ClaimError::InvalidInput {
                reason: "transaction hash and token id are required".to_string(),
            });
        }
        if !signer::is_valid_address(&request.user_address) {
            return Err(ClaimError::InvalidInput {
                reason: "user address is not a valid account address".to_string(),
            });
        }

        let event = self
            .ledger
            .event_by_id(request.event_id)?
            .ok_or(ClaimError::EventNotFound)?;

        if self
            .ledger
            .find_claim(event.id, &request.user_address)?
            .is_some()
        {
            return Err(ClaimError::AlreadyRecorded);
        }

        let recorded = self.ledger.record_claim(&NewClaim {
            event_id: event.id,
            user_address: request.user_address.clone(),
            token_id: request.token_id.clone(),
            transaction_hash: request.transaction_hash.clone(),
        })?;

        info!(
            event_id = event.id,
            claim_id = recorded.id,
            tx = %recorded.transaction_hash,
            "claim recorded"
        );

        if let Some(contract) = &event.contract_address {
            self.spawn_receipt_check(recorded.transaction_hash.clone(), contract.clone());
        }

        Ok(RecordedClaim {
            stamp: stamp_projection(&recorded, &event),
            transaction: TransactionInfo {
                hash: request.transaction_hash.clone(),
                block_number: request.block_number,
                gas_used: request.gas_used,
            },
        })
    }

    /// Returns every stamp for `user_address`.
    ///
    /// Tolerates events deleted after their claim was recorded: those
    /// claims are omitted rather than failing the listing.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimError::InvalidInput`] for a malformed address, or a
    /// storage-class error if the lookup fails.
    pub fn stamps_for_user(&self, user_address: &str) -> Result<Vec<Stamp>, ClaimError> {
        if !signer::is_valid_address(user_address) {
            return Err(ClaimError::InvalidInput {
                reason: "user address is not a valid account address".to_string(),
            });
        }

        let stamps = self
            .ledger
            .claims_for_user(user_address)?
            .iter()
            .map(|(claim, event)| stamp_projection(claim, event))
            .collect();

        Ok(stamps)
    }

    /// Fires off a bounded receipt check when a checker is configured and
    /// a runtime is available. Verdicts only ever reach the log.
    fn spawn_receipt_check(&self, transaction_hash: String, contract_address: String) {
        let Some(checker) = self.receipt_checker.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no async runtime; skipping receipt check");
            return;
        };

        handle.spawn(async move {
            match checker.check(&transaction_hash, &contract_address).await {
                ReceiptVerdict::Confirmed => {
                    debug!(tx = %transaction_hash, "receipt confirmed on-chain");
                }
                ReceiptVerdict::Mismatch { reason } => {
                    warn!(tx = %transaction_hash, %reason, "recorded claim failed receipt check");
                }
                ReceiptVerdict::Unavailable => {
                    debug!(tx = %transaction_hash, "receipt unavailable; skipping verification");
                }
            }
        });
    }
}

/// Rejects authorization outside the event's configured claim window.
fn check_claim_window(event: &EventRecord) -> Result<(), ClaimError> {
    let now = Utc::now().timestamp();

    if let Some(start) = event.claim_start {
        if now < start {
            return Err(ClaimError::ClaimingNotYetOpen);
        }
    }
    if let Some(end) = event.claim_end {
        if now > end {
            return Err(ClaimError::ClaimingClosed);
        }
    }
    Ok(())
}

fn event_data(event: &EventRecord) -> EventData {
    EventData {
        name: event.name.clone(),
        description: event.description.clone(),
        image_url: event.image_url.clone(),
        event_date: event.event_date.clone(),
        organizer: event.organizer.clone(),
    }
}

fn stamp_projection(claim: &ClaimRecord, event: &EventRecord) -> Stamp {
    Stamp {
        id: claim.id,
        token_id: claim.token_id.clone(),
        event_name: event.name.clone(),
        description: event.description.clone(),
        image_url: event.image_url.clone(),
        contract_address: event.contract_address.clone(),
        claimed_at: claim.claimed_at,
        event_date: event.event_date.clone(),
        organizer: event.organizer.clone(),
    }
}
