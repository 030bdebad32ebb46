//! `SQLite`-backed implementation of the event and claim ledgers.

// SQLite returns i64 for row IDs and counters, but they're always
// non-negative here. Mutex poisoning indicates a panic in another thread,
// which is unrecoverable.
#![allow(clippy::cast_sign_loss, clippy::missing_panics_doc)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};
use thiserror::Error;

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Number of attempts for read lookups that hit a busy database.
const READ_RETRY_ATTEMPTS: u32 = 3;

/// Base backoff between read retries.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(25);

/// Errors from ledger operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An event with this join code already exists.
    #[error("event code already in use: {code}")]
    DuplicateEventCode {
        /// The conflicting code, uppercased.
        code: String,
    },

    /// A claim already exists for this `(event, user)` pair.
    ///
    /// Raised by the uniqueness constraint at insert time, which makes it
    /// reliable even when two record calls for the same pair race.
    #[error("claim already recorded for event {event_id} by {user_address}")]
    DuplicateClaim {
        /// The event being claimed.
        event_id: i64,
        /// The claiming address, lowercased.
        user_address: String,
    },

    /// The guarded supply increment found no remaining supply.
    #[error("event {event_id} has no remaining supply")]
    SupplyExhausted {
        /// The event whose supply ran out.
        event_id: i64,
    },

    /// The database stayed busy past the bounded retry window.
    #[error("storage unavailable")]
    Unavailable,
}

/// A row in the event ledger.
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Opaque identifier assigned at creation.
    pub id: i64,
    /// Join code, always stored uppercase.
    pub event_code: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Stamp artwork URL.
    pub image_url: String,
    /// Human-readable event date.
    pub event_date: String,
    /// Organizer display name.
    pub organizer: String,
    /// On-chain contract address; `None` until deployed.
    pub contract_address: Option<String>,
    /// Supply cap; `None` means unbounded.
    pub max_supply: Option<u32>,
    /// Number of recorded claims. Mutated only by [`ClaimLedger::record_claim`].
    pub total_claimed: u32,
    /// Claim window start (unix seconds), if configured.
    pub claim_start: Option<i64>,
    /// Claim window end (unix seconds), if configured.
    pub claim_end: Option<i64>,
    /// Creation time (unix seconds).
    pub created_at: i64,
}

/// Input for creating an event.
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    /// Join code; uppercased on write.
    pub event_code: String,
    /// Display name.
    pub name: String,
    /// Display description.
    pub description: String,
    /// Stamp artwork URL.
    pub image_url: String,
    /// Human-readable event date.
    pub event_date: String,
    /// Organizer display name.
    pub organizer: String,
    /// On-chain contract address, when already deployed.
    pub contract_address: Option<String>,
    /// Supply cap; `None` means unbounded.
    pub max_supply: Option<u32>,
    /// Claim window start (unix seconds).
    pub claim_start: Option<i64>,
    /// Claim window end (unix seconds).
    pub claim_end: Option<i64>,
}

/// A row in the claim ledger.
#[derive(Debug, Clone)]
pub struct ClaimRecord {
    /// Auto-assigned sequence number.
    pub id: i64,
    /// The claimed event.
    pub event_id: i64,
    /// Claiming address, stored lowercase.
    pub user_address: String,
    /// Token id minted on-chain.
    pub token_id: String,
    /// Hash of the minting transaction.
    pub transaction_hash: String,
    /// Insertion time (unix seconds), immutable.
    pub claimed_at: i64,
}

/// Input for recording a claim.
#[derive(Debug, Clone)]
pub struct NewClaim {
    /// The claimed event.
    pub event_id: i64,
    /// Claiming address; lowercased on write.
    pub user_address: String,
    /// Token id from the on-chain mint.
    pub token_id: String,
    /// Hash of the minting transaction.
    pub transaction_hash: String,
}

/// The event and claim ledgers behind one `SQLite` connection.
///
/// WAL mode allows concurrent reads while a record transaction is in
/// flight. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct ClaimLedger {
    conn: Arc<Mutex<Connection>>,
}

impl ClaimLedger {
    /// Opens or creates a ledger database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory ledger for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an event.
    ///
    /// The join code is uppercased before writing so lookups by any casing
    /// of the code resolve to the same event.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateEventCode`] if the code is taken.
    pub fn create_event(&self, event: &NewEvent) -> Result<EventRecord, LedgerError> {
        let code = event.event_code.trim().to_uppercase();
        let created_at = Utc::now().timestamp();

        let conn = self.conn.lock().unwrap();
        let result = conn.execute(
            "INSERT INTO events (event_code, name, description, image_url, event_date, organizer,
                                 contract_address, max_supply, claim_start, claim_end, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                code,
                event.name,
                event.description,
                event.image_url,
                event.event_date,
                event.organizer,
                event.contract_address,
                event.max_supply,
                event.claim_start,
                event.claim_end,
                created_at,
            ],
        );

        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(LedgerError::DuplicateEventCode { code });
            }
            Err(e) => return Err(e.into()),
        }

        let id = conn.last_insert_rowid();
        drop(conn);

        Ok(self
            .event_by_id(id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?)
    }

    /// Looks up an event by join code, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails after bounded busy retries.
    pub fn event_by_code(&self, code: &str) -> Result<Option<EventRecord>, LedgerError> {
        let code = code.trim().to_uppercase();
        self.with_read_retry(|conn| {
            conn.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_code = ?1"),
                params![code],
                event_from_row,
            )
            .optional()
        })
    }

    /// Looks up an event by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails after bounded busy retries.
    pub fn event_by_id(&self, id: i64) -> Result<Option<EventRecord>, LedgerError> {
        self.with_read_retry(|conn| {
            conn.query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![id],
                event_from_row,
            )
            .optional()
        })
    }

    /// Finds the claim for a `(event, user)` pair, if one exists.
    ///
    /// The address is compared lowercased, matching how claims are stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails after bounded busy retries.
    pub fn find_claim(
        &self,
        event_id: i64,
        user_address: &str,
    ) -> Result<Option<ClaimRecord>, LedgerError> {
        let user = user_address.to_lowercase();
        self.with_read_retry(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {CLAIM_COLUMNS} FROM claims
                     WHERE event_id = ?1 AND user_address = ?2"
                ),
                params![event_id, user],
                claim_from_row,
            )
            .optional()
        })
    }

    /// Records a claim and bumps the event's claimed counter atomically.
    ///
    /// Both writes happen in one transaction: the claim INSERT (whose
    /// uniqueness constraint is the authoritative duplicate defense) and a
    /// guarded `total_claimed` increment that refuses to exceed
    /// `max_supply`. Either both commit or neither does.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateClaim`] if a claim for this pair already
    ///   exists, including when a concurrent record call won the race.
    /// - [`LedgerError::SupplyExhausted`] if the guarded increment found
    ///   no remaining supply; the claim insert is rolled back.
    pub fn record_claim(&self, claim: &NewClaim) -> Result<ClaimRecord, LedgerError> {
        let user = claim.user_address.to_lowercase();
        let claimed_at = Utc::now().timestamp();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO claims (event_id, user_address, token_id, transaction_hash, claimed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                claim.event_id,
                user,
                claim.token_id,
                claim.transaction_hash,
                claimed_at,
            ],
        );

        match inserted {
            Ok(_) => {}
            // Dropping the uncommitted transaction rolls it back.
            Err(e) if is_constraint_violation(&e) => {
                return Err(LedgerError::DuplicateClaim {
                    event_id: claim.event_id,
                    user_address: user,
                });
            }
            Err(e) => return Err(e.into()),
        }

        let claim_id = tx.last_insert_rowid();

        let updated = tx.execute(
            "UPDATE events SET total_claimed = total_claimed + 1
             WHERE id = ?1 AND (max_supply IS NULL OR total_claimed < max_supply)",
            params![claim.event_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::SupplyExhausted {
                event_id: claim.event_id,
            });
        }

        tx.commit()?;

        Ok(ClaimRecord {
            id: claim_id,
            event_id: claim.event_id,
            user_address: user,
            token_id: claim.token_id.clone(),
            transaction_hash: claim.transaction_hash.clone(),
            claimed_at,
        })
    }

    /// Returns every claim for `user_address` joined with its event.
    ///
    /// Uses an inner join: a claim whose event has since been deleted is
    /// silently omitted rather than failing the whole listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails after bounded busy retries.
    pub fn claims_for_user(
        &self,
        user_address: &str,
    ) -> Result<Vec<(ClaimRecord, EventRecord)>, LedgerError> {
        let user = user_address.to_lowercase();
        self.with_read_retry(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.event_id, c.user_address, c.token_id, c.transaction_hash,
                        c.claimed_at,
                        e.id, e.event_code, e.name, e.description, e.image_url, e.event_date,
                        e.organizer, e.contract_address, e.max_supply, e.total_claimed,
                        e.claim_start, e.claim_end, e.created_at
                 FROM claims c
                 INNER JOIN events e ON e.id = c.event_id
                 WHERE c.user_address = ?1
                 ORDER BY c.claimed_at DESC, c.id DESC",
            )?;

            let rows = stmt.query_map(params![user], |row| {
                let claim = ClaimRecord {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    user_address: row.get(2)?,
                    token_id: row.get(3)?,
                    transaction_hash: row.get(4)?,
                    claimed_at: row.get(5)?,
                };
                let event = EventRecord {
                    id: row.get(6)?,
                    event_code: row.get(7)?,
                    name: row.get(8)?,
                    description: row.get(9)?,
                    image_url: row.get(10)?,
                    event_date: row.get(11)?,
                    organizer: row.get(12)?,
                    contract_address: row.get(13)?,
                    max_supply: row.get(14)?,
                    total_claimed: row.get(15)?,
                    claim_start: row.get(16)?,
                    claim_end: row.get(17)?,
                    created_at: row.get(18)?,
                };
                Ok((claim, event))
            })?;

            rows.collect::<Result<Vec<_>, _>>()
        })
    }

    /// Deletes an event row. Exists for the read-path tolerance tests;
    /// normal operation never deletes events.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    #[doc(hidden)]
    pub fn delete_event(&self, id: i64) -> Result<(), LedgerError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Runs a read-only query, retrying a bounded number of times when the
    /// database is busy. Writes never go through this path: a write must
    /// not be blindly retried without re-checking duplicate state.
    fn with_read_retry<T>(
        &self,
        query: impl Fn(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, LedgerError> {
        for attempt in 1..=READ_RETRY_ATTEMPTS {
            let result = {
                let conn = self.conn.lock().unwrap();
                query(&conn)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) && attempt < READ_RETRY_ATTEMPTS => {
                    std::thread::sleep(READ_RETRY_BACKOFF * attempt);
                }
                Err(e) if is_busy(&e) => return Err(LedgerError::Unavailable),
                Err(e) => return Err(e.into()),
            }
        }
        Err(LedgerError::Unavailable)
    }
}

const EVENT_COLUMNS: &str = "id, event_code, name, description, image_url, event_date, organizer,
     contract_address, max_supply, total_claimed, claim_start, claim_end, created_at";

const CLAIM_COLUMNS: &str =
    "id, event_id, user_address, token_id, transaction_hash, claimed_at";

fn event_from_row(row: &rusqlite::Row<'_>) -> Result<EventRecord, rusqlite::Error> {
    Ok(EventRecord {
        id: row.get(0)?,
        event_code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        event_date: row.get(5)?,
        organizer: row.get(6)?,
        contract_address: row.get(7)?,
        max_supply: row.get(8)?,
        total_claimed: row.get(9)?,
        claim_start: row.get(10)?,
        claim_end: row.get(11)?,
        created_at: row.get(12)?,
    })
}

fn claim_from_row(row: &rusqlite::Row<'_>) -> Result<ClaimRecord, rusqlite::Error> {
    Ok(ClaimRecord {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_address: row.get(2)?,
        token_id: row.get(3)?,
        transaction_hash: row.get(4)?,
        claimed_at: row.get(5)?,
    })
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}
