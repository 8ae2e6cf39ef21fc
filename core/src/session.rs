//! Game session recorder: one open session per seated user, and an
//! append-only history of play.
//!
//! Sessions snapshot the table's game details when they open, so later
//! table changes never rewrite history. Buy-in increments are not
//! idempotent: the chip movement that precedes each call is what
//! guarantees a buy-in is applied at most once.

use crate::{
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    fee::FeeContext,
    lounge::Lounge,
    reconciliation::GapKind,
    types::{Chips, Money, SeatNumber, SessionId, TableId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub table_id: TableId,
    pub seat_number: SeatNumber,
    pub game_type_played: String,
    pub rate_played: String,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
    pub session_start_time: DateTime<Utc>,
    pub chips_in: Chips,
    pub additional_chips_in: Chips,
    pub total_chips_in: Chips,
    pub session_end_time: Option<DateTime<Utc>>,
    pub chips_out: Option<Chips>,
    pub profit: Option<Chips>,
    pub duration_minutes: Option<i64>,
    pub play_fee_calculated: Option<Money>,
    pub play_fee_applied_to_bill: bool,
}

impl GameSession {
    pub fn is_open(&self) -> bool {
        self.session_end_time.is_none()
    }
}

/// What closing a session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub chips_out: Chips,
    pub profit: Chips,
    pub duration_minutes: i64,
    pub play_fee: Money,
}

/// Whole minutes between two instants, rounded to the nearest minute.
pub fn elapsed_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let ms = (end - start).num_milliseconds();
    (ms as f64 / 60_000.0).round() as i64
}

impl Lounge {
    /// Open a session for a user who just put chips on a table.
    /// The caller attaches the returned id to the user.
    pub fn open_session(
        &self,
        user_id: &str,
        table_id: &str,
        seat_number: SeatNumber,
        initial_buy_in: Chips,
    ) -> LedgerResult<SessionId> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = self.now();

        self.store.run_transaction(|tx| {
            let table = tx
                .table(table_id)?
                .ok_or_else(|| LedgerError::not_found(format!("table {table_id}")))?;
            let session = GameSession {
                session_id: session_id.clone(),
                user_id: user_id.to_string(),
                table_id: table.table_id,
                seat_number,
                game_type_played: table.game_type,
                rate_played: table.rate,
                min_buy_in: table.min_buy_in,
                max_buy_in: table.max_buy_in,
                session_start_time: now,
                chips_in: initial_buy_in,
                additional_chips_in: 0,
                total_chips_in: initial_buy_in,
                session_end_time: None,
                chips_out: None,
                profit: None,
                duration_minutes: None,
                play_fee_calculated: None,
                play_fee_applied_to_bill: false,
            };
            tx.insert_session(&session)?;
            tx.append_event(
                &LedgerEvent::SessionOpened {
                    session_id: session_id.clone(),
                    user_id: user_id.to_string(),
                    table_id: table_id.to_string(),
                    seat_number,
                    buy_in: initial_buy_in,
                },
                now,
            )
        })?;

        log::debug!("session: opened {session_id} for {user_id} at {table_id}/{seat_number}");
        Ok(session_id)
    }

    /// Add a later buy-in to an open session.
    pub fn add_buy_in(&self, session_id: &str, amount: Chips) -> LedgerResult<()> {
        if amount < 0 {
            return Err(LedgerError::invalid(format!(
                "buy-in must be zero or more, got {amount}"
            )));
        }
        let now = self.now();
        self.store.run_transaction(|tx| {
            let session = tx
                .session(session_id)?
                .ok_or_else(|| LedgerError::not_found(format!("game session {session_id}")))?;
            if !session.is_open() {
                return Err(LedgerError::precondition(format!(
                    "game session {session_id} is already closed"
                )));
            }
            if !tx.increment_buy_in(session_id, amount)? {
                return Err(LedgerError::Internal(format!(
                    "game session {session_id} changed during buy-in"
                )));
            }
            tx.append_event(
                &LedgerEvent::BuyInAdded {
                    session_id: session_id.to_string(),
                    user_id: session.user_id.clone(),
                    amount,
                },
                now,
            )
        })?;
        log::debug!("session: {session_id} buy-in +{amount}");
        Ok(())
    }

    /// Close a session with its final stack. Closing a missing or already
    /// closed session changes nothing and returns `None`.
    pub fn close_session(
        &self,
        session_id: &str,
        chips_out: Chips,
        end_time: DateTime<Utc>,
    ) -> LedgerResult<Option<ClosedSession>> {
        let closed = self.store.run_transaction(|tx| {
            let Some(mut session) = tx.session(session_id)? else {
                log::warn!("session: close requested for unknown session {session_id}");
                return Ok(None);
            };
            if !session.is_open() {
                log::warn!("session: {session_id} is already closed, ignoring close");
                return Ok(None);
            }

            let duration_minutes = elapsed_minutes(session.session_start_time, end_time);
            let play_fee = self
                .fees()
                .play_fee(&FeeContext {
                    duration_minutes,
                    game_type: &session.game_type_played,
                    rate: &session.rate_played,
                    min_buy_in: session.min_buy_in,
                    max_buy_in: session.max_buy_in,
                })
                .max(0);
            let profit = chips_out - session.total_chips_in;

            session.session_end_time = Some(end_time);
            session.chips_out = Some(chips_out);
            session.profit = Some(profit);
            session.duration_minutes = Some(duration_minutes);
            session.play_fee_calculated = Some(play_fee);
            session.play_fee_applied_to_bill = play_fee > 0;

            if !tx.write_session_close(&session)? {
                return Ok(None);
            }
            tx.append_event(
                &LedgerEvent::SessionClosed {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id.clone(),
                    chips_out,
                    profit,
                    duration_minutes,
                    play_fee,
                },
                end_time,
            )?;
            Ok(Some(ClosedSession {
                session_id: session.session_id,
                user_id: session.user_id,
                chips_out,
                profit,
                duration_minutes,
                play_fee,
            }))
        })?;

        if let Some(c) = &closed {
            log::info!(
                "session: closed {} for {} after {} min, profit {}, fee {}",
                c.session_id,
                c.user_id,
                c.duration_minutes,
                c.profit,
                c.play_fee,
            );
        }
        Ok(closed)
    }

    /// Open a session and point the user at it. Best effort: a failure is
    /// queued as a reconciliation gap and yields `None`.
    pub(crate) fn open_and_attach(
        &self,
        user_id: &str,
        table_id: &str,
        seat_number: SeatNumber,
        buy_in: Chips,
    ) -> Option<SessionId> {
        let opened = self
            .open_session(user_id, table_id, seat_number, buy_in)
            .and_then(|session_id| {
                self.store
                    .run_transaction(|tx| tx.set_active_session(user_id, &session_id))
                    .map(|()| session_id)
            });
        self.follow_up(GapKind::SessionOpenFailed, user_id, None, opened)
    }
}
