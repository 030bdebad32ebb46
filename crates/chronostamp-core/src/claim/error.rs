//! Claim flow error taxonomy.
//!
//! Every variant carries a stable machine-readable kind (for transport
//! mapping) and a human-readable message. Internal detail - SQL text, key
//! material, stack traces - never crosses this boundary: storage and
//! signer failures collapse into the generic variants before reaching a
//! caller.

use thiserror::Error;
use tracing::error;

use crate::ledger::LedgerError;

/// Terminal failures of the authorize, record, and query flows.
///
/// Gate failures are never retried by the orchestrator; the wallet-driving
/// client decides whether to request a fresh authorization.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClaimError {
    /// A request field is missing or syntactically invalid.
    #[error("{reason}")]
    InvalidInput {
        /// What was wrong with the input.
        reason: String,
    },

    /// No event matches the given code or id.
    #[error("event not found")]
    EventNotFound,

    /// This user already holds a claim for this event.
    #[error("this address has already claimed this event")]
    AlreadyClaimed,

    /// A claim for this pair was already recorded.
    ///
    /// Also the outcome when a concurrent record call for the same pair
    /// wins the insert race.
    #[error("this claim has already been recorded")]
    AlreadyRecorded,

    /// The event's supply is exhausted.
    #[error("this event is sold out")]
    SoldOut,

    /// The event has no on-chain contract yet.
    #[error("this event's contract has not been deployed")]
    ContractNotDeployed,

    /// The claim window has not opened.
    #[error("claiming for this event has not yet opened")]
    ClaimingNotYetOpen,

    /// The claim window has closed.
    #[error("claiming for this event has closed")]
    ClaimingClosed,

    /// The signer failed a health or crypto check.
    ///
    /// Deliberately unspecific: the caller learns the service is
    /// misconfigured, not which check failed.
    #[error("service is misconfigured")]
    ServerMisconfigured,

    /// Storage stayed unavailable past the bounded retry window.
    #[error("storage temporarily unavailable")]
    StorageUnavailable,

    /// Anything else. Details go to the log, not the caller.
    #[error("internal error")]
    Internal,
}

impl ClaimError {
    /// Stable machine-readable kind for transport-level mapping.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::EventNotFound => "event_not_found",
            Self::AlreadyClaimed => "already_claimed",
            Self::AlreadyRecorded => "already_recorded",
            Self::SoldOut => "sold_out",
            Self::ContractNotDeployed => "contract_not_deployed",
            Self::ClaimingNotYetOpen => "claiming_not_yet_open",
            Self::ClaimingClosed => "claiming_closed",
            Self::ServerMisconfigured => "server_misconfigured",
            Self::StorageUnavailable => "storage_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl From<LedgerError> for ClaimError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::DuplicateClaim { .. } => Self::AlreadyRecorded,
            LedgerError::SupplyExhausted { .. } => Self::SoldOut,
            LedgerError::Unavailable => Self::StorageUnavailable,
            LedgerError::DuplicateEventCode { .. } => Self::Internal,
            LedgerError::Database(e) => {
                error!(error = %e, "ledger operation failed");
                Self::Internal
            }
        }
    }
}
