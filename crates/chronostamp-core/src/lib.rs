//! chronostamp-core - ChronoStamp claim authorization core
//!
//! This library implements the off-chain half of the ChronoStamp
//! proof-of-attendance system: event organizers create events with a
//! human-readable join code, attendees redeem that code for a signed
//! mint authorization, and confirmed on-chain mints are recorded in a
//! relational ledger that enforces at most one claim per
//! `(user, event)` pair.
//!
//! # Modules
//!
//! - [`config`]: Service configuration (environment-selected signer keys,
//!   ledger path, optional chain RPC endpoint)
//! - [`signer`]: ECDSA mint-authorization signing over
//!   `keccak256(address ‖ nonce)` with the Ethereum personal-sign prefix
//! - [`ledger`]: `SQLite`-backed event and claim tables with the
//!   uniqueness constraint that prevents double-claiming
//! - [`claim`]: The claim orchestrator - authorize, record, and query
//!   flows tying the signer and ledger together
//! - [`chain`]: Best-effort transaction-receipt verification against a
//!   JSON-RPC endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use chronostamp_core::claim::{AuthorizeRequest, ClaimOrchestrator};
//! use chronostamp_core::ledger::ClaimLedger;
//! use chronostamp_core::signer::{SignerConfig, SignerService};
//! use secrecy::SecretString;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = ClaimLedger::open("/var/lib/chronostamp/ledger.db")?;
//! let signer = SignerService::new(SignerConfig {
//!     private_key_hex: SecretString::new("0x...".to_string()),
//!     expected_address: None,
//! })?;
//! let orchestrator = ClaimOrchestrator::new(ledger, signer, None);
//!
//! let auth = orchestrator.authorize(&AuthorizeRequest {
//!     event_code: "DEVCONF2024".into(),
//!     user_address: "0x8ba1f109551bD432803012645Ac136ddd64DBA72".into(),
//! })?;
//! println!("nonce: {}", auth.nonce);
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod claim;
pub mod config;
pub mod ledger;
pub mod signer;
