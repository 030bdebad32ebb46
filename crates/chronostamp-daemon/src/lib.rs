//! chronostamp-daemon - ChronoStamp claim service daemon library
//!
//! Exposes the claim orchestrator over HTTP+JSON. The daemon binary wires
//! configuration, the signer, and the ledger together and serves the
//! [`http`] router; the library surface exists so integration tests can
//! drive the same router in-process.
//!
//! # Modules
//!
//! - [`http`]: axum router, request handlers, and the error-to-status
//!   mapping for the authorize/record/query contracts

pub mod http;
