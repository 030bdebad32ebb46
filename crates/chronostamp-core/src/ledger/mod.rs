//! Event and claim ledger backed by `SQLite`.
//!
//! Two tables back the claim protocol: `events` carries supply accounting
//! and the optional claim window for each event, and `claims` holds exactly
//! one row per successful `(user, event)` mint. The `UNIQUE (event_id,
//! user_address)` constraint on `claims` is the authoritative double-claim
//! defense; [`ClaimLedger::record_claim`] performs the claim insert and the
//! supply-counter increment in a single transaction so the two can never
//! diverge.
//!
//! # Example
//!
//! ```rust,no_run
//! use chronostamp_core::ledger::{ClaimLedger, NewEvent};
//!
//! # fn example() -> Result<(), chronostamp_core::ledger::LedgerError> {
//! let ledger = ClaimLedger::open("/var/lib/chronostamp/ledger.db")?;
//! let event = ledger.create_event(&NewEvent {
//!     event_code: "devconf2024".into(),
//!     name: "DevConf 2024".into(),
//!     max_supply: Some(500),
//!     ..NewEvent::default()
//! })?;
//! assert_eq!(event.event_code, "DEVCONF2024");
//! # Ok(())
//! # }
//! ```

mod store;

#[cfg(test)]
mod tests;

pub use store::{ClaimLedger, ClaimRecord, EventRecord, LedgerError, NewClaim, NewEvent};
