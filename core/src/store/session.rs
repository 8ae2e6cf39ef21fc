use super::LedgerTx;
use crate::{
    clock::{from_millis, from_millis_opt, to_millis},
    error::LedgerResult,
    session::GameSession,
    types::Chips,
};
use rusqlite::{params, OptionalExtension, Row};

const SESSION_COLUMNS: &str = "session_id, user_id, table_id, seat_number,
     game_type_played, rate_played, min_buy_in, max_buy_in, session_start_time,
     chips_in, additional_chips_in, total_chips_in, session_end_time, chips_out,
     profit, duration_minutes, play_fee_calculated, play_fee_applied_to_bill";

struct RawSession {
    session: GameSession,
    start_ms: i64,
    end_ms: Option<i64>,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let start_ms: i64 = row.get(8)?;
        let end_ms: Option<i64> = row.get(12)?;
        Ok(Self {
            session: GameSession {
                session_id: row.get(0)?,
                user_id: row.get(1)?,
                table_id: row.get(2)?,
                seat_number: row.get(3)?,
                game_type_played: row.get(4)?,
                rate_played: row.get(5)?,
                min_buy_in: row.get(6)?,
                max_buy_in: row.get(7)?,
                session_start_time: Default::default(),
                chips_in: row.get(9)?,
                additional_chips_in: row.get(10)?,
                total_chips_in: row.get(11)?,
                session_end_time: None,
                chips_out: row.get(13)?,
                profit: row.get(14)?,
                duration_minutes: row.get(15)?,
                play_fee_calculated: row.get(16)?,
                play_fee_applied_to_bill: row.get(17)?,
            },
            start_ms,
            end_ms,
        })
    }

    fn decode(self) -> LedgerResult<GameSession> {
        let mut session = self.session;
        session.session_start_time = from_millis(self.start_ms)?;
        session.session_end_time = from_millis_opt(self.end_ms)?;
        Ok(session)
    }
}

impl LedgerTx<'_> {
    // ── Game session ──────────────────────────────────────────────

    pub fn insert_session(&self, s: &GameSession) -> LedgerResult<()> {
        self.tx.execute(
            &format!(
                "INSERT INTO game_session ({SESSION_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
            ),
            params![
                s.session_id,
                s.user_id,
                s.table_id,
                s.seat_number,
                s.game_type_played,
                s.rate_played,
                s.min_buy_in,
                s.max_buy_in,
                to_millis(s.session_start_time),
                s.chips_in,
                s.additional_chips_in,
                s.total_chips_in,
                s.session_end_time.map(to_millis),
                s.chips_out,
                s.profit,
                s.duration_minutes,
                s.play_fee_calculated,
                s.play_fee_applied_to_bill,
            ],
        )?;
        Ok(())
    }

    pub fn session(&self, session_id: &str) -> LedgerResult<Option<GameSession>> {
        let raw = self
            .tx
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM game_session WHERE session_id = ?1"),
                params![session_id],
                RawSession::from_row,
            )
            .optional()?;
        raw.map(RawSession::decode).transpose()
    }

    pub fn sessions_for_user(&self, user_id: &str) -> LedgerResult<Vec<GameSession>> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM game_session
                 WHERE user_id = ?1 ORDER BY session_start_time ASC, rowid ASC"
            ),
            Some(user_id),
        )
    }

    pub fn open_sessions(&self) -> LedgerResult<Vec<GameSession>> {
        self.query_sessions(
            &format!(
                "SELECT {SESSION_COLUMNS} FROM game_session
                 WHERE session_end_time IS NULL ORDER BY user_id, session_start_time"
            ),
            None,
        )
    }

    fn query_sessions(&self, sql: &str, user_id: Option<&str>) -> LedgerResult<Vec<GameSession>> {
        let mut stmt = self.tx.prepare(sql)?;
        let raw = match user_id {
            Some(id) => stmt
                .query_map(params![id], RawSession::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], RawSession::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        raw.into_iter().map(RawSession::decode).collect()
    }

    /// Field-level atomic delta on an open session's buy-in totals.
    /// Returns false if the session is missing or already closed.
    pub fn increment_buy_in(&self, session_id: &str, amount: Chips) -> LedgerResult<bool> {
        let changed = self.tx.execute(
            "UPDATE game_session
             SET additional_chips_in = additional_chips_in + ?1,
                 total_chips_in = total_chips_in + ?1
             WHERE session_id = ?2 AND session_end_time IS NULL",
            params![amount, session_id],
        )?;
        Ok(changed > 0)
    }

    /// Persist the closing fields. Only an open session can be closed.
    pub fn write_session_close(&self, s: &GameSession) -> LedgerResult<bool> {
        let changed = self.tx.execute(
            "UPDATE game_session SET
                session_end_time = ?1, chips_out = ?2, profit = ?3,
                duration_minutes = ?4, play_fee_calculated = ?5,
                play_fee_applied_to_bill = ?6
             WHERE session_id = ?7 AND session_end_time IS NULL",
            params![
                s.session_end_time.map(to_millis),
                s.chips_out,
                s.profit,
                s.duration_minutes,
                s.play_fee_calculated,
                s.play_fee_applied_to_bill,
                s.session_id,
            ],
        )?;
        Ok(changed > 0)
    }
}
