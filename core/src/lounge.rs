//! The lounge ledger: wires the store, clock, config and fee policy
//! together and hosts every floor operation.
//!
//! OPERATION SHAPE (every mutating operation follows it):
//!   1. Capability check, once, at entry.
//!   2. Request validation, before any store access.
//!   3. One atomic transaction: read, validate preconditions, write,
//!      append ledger events. A precondition failure rolls back everything.
//!   4. Optional follow-up (session bookkeeping, fee billing). Follow-ups
//!      run after the commit and can fail on their own; a failure is
//!      logged and queued as a reconciliation gap, never surfaced as an
//!      error for the operation that already committed.

use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::LoungeConfig,
    custody::UserRecord,
    error::{LedgerError, LedgerResult},
    fee::{FeePolicy, TimeBlockFee},
    reconciliation::GapKind,
    store::LedgerStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct Lounge {
    pub store: LedgerStore,
    config: LoungeConfig,
    clock: Arc<dyn Clock>,
    fees: Box<dyn FeePolicy>,
}

impl Lounge {
    pub fn new(store: LedgerStore, config: LoungeConfig, clock: Arc<dyn Clock>) -> Self {
        let fees = Box::new(TimeBlockFee::new(&config.fee_policy));
        Self {
            store,
            config,
            clock,
            fees,
        }
    }

    /// Open the database at `db_path`, migrate it and install the
    /// configured tables. Uses the system clock.
    pub fn build(db_path: &str, config: LoungeConfig) -> LedgerResult<Self> {
        let store = LedgerStore::open(db_path)?;
        store.migrate()?;
        let lounge = Self::new(store, config, Arc::new(SystemClock));
        lounge.install_tables()?;
        Ok(lounge)
    }

    /// In-memory lounge on the test config, driven by `clock`.
    pub fn build_test(clock: Arc<ManualClock>) -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        let lounge = Self::new(store, LoungeConfig::default_test(), clock);
        lounge.install_tables()?;
        Ok(lounge)
    }

    /// Swap the play-fee rule. The default is the configured time-block fee.
    pub fn with_fee_policy(mut self, fees: Box<dyn FeePolicy>) -> Self {
        self.fees = fees;
        self
    }

    pub fn config(&self) -> &LoungeConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn fees(&self) -> &dyn FeePolicy {
        self.fees.as_ref()
    }

    pub fn install_tables(&self) -> LedgerResult<()> {
        for table in &self.config.tables {
            self.store.upsert_table(table)?;
        }
        log::debug!("lounge: installed {} tables", self.config.tables.len());
        Ok(())
    }

    /// Create a user with an empty ledger. Registration and ID
    /// verification happen upstream; this only materializes the record.
    pub fn register_user(&self, user_id: &str, display_name: &str) -> LedgerResult<UserRecord> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::invalid("userId must not be empty"));
        }
        let user = UserRecord::new(user_id, display_name);
        let now = self.now();
        self.store.run_transaction(|tx| {
            if tx.user(user_id)?.is_some() {
                return Err(LedgerError::precondition(format!("user {user_id} already exists")));
            }
            tx.insert_user(&user, now)
        })?;
        log::debug!("lounge: registered user {user_id}");
        Ok(user)
    }

    // ── Follow-up steps ───────────────────────────────────────────

    /// Unwrap a follow-up result, turning a failure into a queued gap.
    pub(crate) fn follow_up<T>(
        &self,
        kind: GapKind,
        user_id: &str,
        session_id: Option<&str>,
        result: LedgerResult<T>,
    ) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.flag_gap(kind, user_id, session_id, &e.to_string());
                None
            }
        }
    }

    pub(crate) fn flag_gap(
        &self,
        kind: GapKind,
        user_id: &str,
        session_id: Option<&str>,
        detail: &str,
    ) {
        log::warn!(
            "follow-up {} for user {user_id} did not complete: {detail}",
            kind.as_str()
        );
        if let Err(e) = self
            .store
            .record_gap(kind, user_id, session_id, detail, self.now())
        {
            log::error!("could not queue reconciliation gap for user {user_id}: {e}");
        }
    }
}
