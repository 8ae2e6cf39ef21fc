use super::{LedgerStore, LedgerTx};
use crate::{
    clock::{from_millis_opt, to_millis},
    custody::UserRecord,
    error::{LedgerError, LedgerResult},
    settlement::PendingChipSettlement,
    types::Money,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const USER_COLUMNS: &str = "user_id, display_name, chips, chips_in_play, bill, is_checked_in,
     current_table_id, current_seat_number, active_game_session_id,
     pending_chip_settlement, checked_in_at, checked_out_at";

/// A user row exactly as stored, before JSON and timestamp decoding.
struct RawUser {
    user_id: String,
    display_name: String,
    chips: i64,
    chips_in_play: i64,
    bill: i64,
    is_checked_in: bool,
    current_table_id: Option<String>,
    current_seat_number: Option<i64>,
    active_game_session_id: Option<String>,
    pending_chip_settlement: Option<String>,
    checked_in_at: Option<i64>,
    checked_out_at: Option<i64>,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            chips: row.get(2)?,
            chips_in_play: row.get(3)?,
            bill: row.get(4)?,
            is_checked_in: row.get(5)?,
            current_table_id: row.get(6)?,
            current_seat_number: row.get(7)?,
            active_game_session_id: row.get(8)?,
            pending_chip_settlement: row.get(9)?,
            checked_in_at: row.get(10)?,
            checked_out_at: row.get(11)?,
        })
    }

    fn decode(self) -> LedgerResult<UserRecord> {
        let pending_chip_settlement = self
            .pending_chip_settlement
            .as_deref()
            .map(serde_json::from_str::<PendingChipSettlement>)
            .transpose()
            .map_err(|e| {
                LedgerError::Internal(format!(
                    "malformed pending settlement for user {}: {e}",
                    self.user_id
                ))
            })?;
        Ok(UserRecord {
            user_id: self.user_id,
            display_name: self.display_name,
            chips: self.chips,
            chips_in_play: self.chips_in_play,
            bill: self.bill,
            is_checked_in: self.is_checked_in,
            current_table_id: self.current_table_id,
            current_seat_number: self.current_seat_number,
            active_game_session_id: self.active_game_session_id,
            pending_chip_settlement,
            checked_in_at: from_millis_opt(self.checked_in_at)?,
            checked_out_at: from_millis_opt(self.checked_out_at)?,
        })
    }
}

impl LedgerStore {
    pub fn all_users(&self) -> LedgerResult<Vec<UserRecord>> {
        self.read(|tx| tx.all_users())
    }
}

impl LedgerTx<'_> {
    // ── User ──────────────────────────────────────────────────────

    pub fn insert_user(&self, user: &UserRecord, created_at: DateTime<Utc>) -> LedgerResult<()> {
        let pending = user
            .pending_chip_settlement
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.tx.execute(
            "INSERT INTO lounge_user (
                user_id, display_name, chips, chips_in_play, bill, is_checked_in,
                current_table_id, current_seat_number, active_game_session_id,
                pending_chip_settlement, checked_in_at, checked_out_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                user.user_id,
                user.display_name,
                user.chips,
                user.chips_in_play,
                user.bill,
                user.is_checked_in,
                user.current_table_id,
                user.current_seat_number,
                user.active_game_session_id,
                pending,
                user.checked_in_at.map(to_millis),
                user.checked_out_at.map(to_millis),
                to_millis(created_at),
            ],
        )?;
        Ok(())
    }

    pub fn user(&self, user_id: &str) -> LedgerResult<Option<UserRecord>> {
        let raw = self
            .tx
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM lounge_user WHERE user_id = ?1"),
                params![user_id],
                RawUser::from_row,
            )
            .optional()?;
        raw.map(RawUser::decode).transpose()
    }

    pub fn all_users(&self) -> LedgerResult<Vec<UserRecord>> {
        let mut stmt = self
            .tx
            .prepare(&format!("SELECT {USER_COLUMNS} FROM lounge_user ORDER BY user_id"))?;
        let raw = stmt
            .query_map([], RawUser::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawUser::decode).collect()
    }

    /// Write back every mutable field of a user read earlier in this transaction.
    pub fn update_user(&self, user: &UserRecord) -> LedgerResult<()> {
        let pending = user
            .pending_chip_settlement
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let changed = self.tx.execute(
            "UPDATE lounge_user SET
                chips = ?1, chips_in_play = ?2, bill = ?3, is_checked_in = ?4,
                current_table_id = ?5, current_seat_number = ?6,
                active_game_session_id = ?7, pending_chip_settlement = ?8,
                checked_in_at = ?9, checked_out_at = ?10
             WHERE user_id = ?11",
            params![
                user.chips,
                user.chips_in_play,
                user.bill,
                user.is_checked_in,
                user.current_table_id,
                user.current_seat_number,
                user.active_game_session_id,
                pending,
                user.checked_in_at.map(to_millis),
                user.checked_out_at.map(to_millis),
                user.user_id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!("user {}", user.user_id)));
        }
        Ok(())
    }

    pub fn set_active_session(&self, user_id: &str, session_id: &str) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE lounge_user SET active_game_session_id = ?1 WHERE user_id = ?2",
            params![session_id, user_id],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!("user {user_id}")));
        }
        Ok(())
    }

    /// Clear the active session pointer only if it still names `session_id`.
    /// Returns false when the user has since moved on to another session.
    pub fn clear_active_session(&self, user_id: &str, session_id: &str) -> LedgerResult<bool> {
        let changed = self.tx.execute(
            "UPDATE lounge_user SET active_game_session_id = NULL
             WHERE user_id = ?1 AND active_game_session_id = ?2",
            params![user_id, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Field-level atomic delta on the bill.
    pub fn increment_bill(&self, user_id: &str, amount: Money) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE lounge_user SET bill = bill + ?1 WHERE user_id = ?2",
            params![amount, user_id],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!("user {user_id}")));
        }
        Ok(())
    }
}
