//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Operations call store methods. They never execute SQL directly.
//!
//! Every read-modify-write goes through `run_transaction`, which opens an
//! IMMEDIATE transaction so concurrent writers serialize on the database
//! lock. A busy database makes the whole closure run again from scratch,
//! re-reading and re-validating everything it touched.

use crate::{
    clock::to_millis,
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use std::time::Duration;

mod order;
mod reconciliation;
mod session;
mod table;
mod user;
mod withdrawal;

pub use table::{SeatRow, SeatStatus, TableRow};

/// How long SQLite itself waits on a held lock before reporting busy.
const BUSY_TIMEOUT_MS: u64 = 250;
/// Attempts before a busy transaction is reported as an internal error.
const MAX_TX_ATTEMPTS: u32 = 8;
const RETRY_BACKOFF_MS: u64 = 15;

pub struct LedgerStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

/// A unit of work inside one SQLite transaction.
/// Dropping it without commit rolls everything back.
pub struct LedgerTx<'a> {
    tx: Transaction<'a>,
}

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a second, independent connection to the same database.
    /// For in-memory databases this returns a new, isolated database.
    pub fn reopen(&self) -> LedgerResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order. Safe to run more than once.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_users_and_tables.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_game_sessions.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_withdrawals_and_orders.sql"))?;
        Ok(())
    }

    // ── Transactions ──────────────────────────────────────────────

    /// Run `f` atomically. Either every write it made commits or none do.
    pub fn run_transaction<T, F>(&self, mut f: F) -> LedgerResult<T>
    where
        F: FnMut(&LedgerTx<'_>) -> LedgerResult<T>,
    {
        self.with_retry(TransactionBehavior::Immediate, &mut f)
    }

    /// Consistent read-only view. Nothing written inside is kept.
    pub fn read<T, F>(&self, mut f: F) -> LedgerResult<T>
    where
        F: FnMut(&LedgerTx<'_>) -> LedgerResult<T>,
    {
        self.with_retry(TransactionBehavior::Deferred, &mut f)
    }

    fn with_retry<T, F>(&self, behavior: TransactionBehavior, f: &mut F) -> LedgerResult<T>
    where
        F: FnMut(&LedgerTx<'_>) -> LedgerResult<T>,
    {
        let mut attempt = 1;
        loop {
            match self.attempt(behavior, f) {
                Err(e) if e.is_busy() && attempt < MAX_TX_ATTEMPTS => {
                    log::debug!("store: database busy, retrying transaction (attempt {attempt})");
                    std::thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64));
                    attempt += 1;
                }
                Err(e) if e.is_busy() => {
                    return Err(LedgerError::Internal(format!(
                        "transaction abandoned after {MAX_TX_ATTEMPTS} busy attempts: {e}"
                    )));
                }
                other => return other,
            }
        }
    }

    fn attempt<T, F>(&self, behavior: TransactionBehavior, f: &mut F) -> LedgerResult<T>
    where
        F: FnMut(&LedgerTx<'_>) -> LedgerResult<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, behavior)?;
        let ledger_tx = LedgerTx { tx };
        let value = f(&ledger_tx)?;
        match behavior {
            TransactionBehavior::Deferred => ledger_tx.tx.rollback()?,
            _ => ledger_tx.tx.commit()?,
        }
        Ok(value)
    }

    // ── Single-record reads ───────────────────────────────────────

    pub fn user(&self, user_id: &str) -> LedgerResult<Option<crate::custody::UserRecord>> {
        self.read(|tx| tx.user(user_id))
    }

    pub fn seat(&self, table_id: &str, seat_number: i64) -> LedgerResult<Option<SeatRow>> {
        self.read(|tx| tx.seat(table_id, seat_number))
    }

    pub fn session(&self, session_id: &str) -> LedgerResult<Option<crate::session::GameSession>> {
        self.read(|tx| tx.session(session_id))
    }

    pub fn withdrawal(
        &self,
        request_id: &str,
    ) -> LedgerResult<Option<crate::withdrawal::WithdrawalRequest>> {
        self.read(|tx| tx.withdrawal(request_id))
    }

    pub fn order(&self, order_id: &str) -> LedgerResult<Option<crate::orders::Order>> {
        self.read(|tx| tx.order(order_id))
    }

    pub fn sessions_for_user(&self, user_id: &str) -> LedgerResult<Vec<crate::session::GameSession>> {
        self.read(|tx| tx.sessions_for_user(user_id))
    }

    pub fn events_for_user(&self, user_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        self.read(|tx| tx.events_for_user(user_id))
    }
}

impl LedgerTx<'_> {
    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &LedgerEvent, at: DateTime<Utc>) -> LedgerResult<()> {
        let entry = EventLogEntry::new(event, at)?;
        self.tx.execute(
            "INSERT INTO ledger_event (occurred_at, user_id, event_type, payload)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                to_millis(entry.occurred_at),
                entry.user_id,
                entry.event_type,
                entry.payload,
            ],
        )?;
        Ok(())
    }

    pub fn events_for_user(&self, user_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.tx.prepare(
            "SELECT id, occurred_at, user_id, event_type, payload
             FROM ledger_event WHERE user_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, at, user_id, event_type, payload)| {
                EventLogEntry::from_row(id, at, user_id, event_type, payload)
            })
            .collect()
    }
}
