//! Settlement: returning a table stack to the off-table balance.
//!
//! Two phases, so staff and player can never disagree silently:
//!   1. Staff tally the stack (`initiate_settlement`). Nothing moves yet.
//!   2. The player confirms (`confirm_settlement`). Chips are credited,
//!      the seat is vacated and the user leaves the table, all in one
//!      transaction. The game session is closed and the play fee billed
//!      afterwards as a follow-up.

use crate::{
    auth::{authorize, Caller, Capability},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    lounge::Lounge,
    reconciliation::GapKind,
    request::{InitiateSettlementRequest, Validate},
    session::ClosedSession,
    types::{Chips, Money, SeatNumber, TableId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Embedded on the user between tally and confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChipSettlement {
    pub table_id: TableId,
    pub seat_number: SeatNumber,
    pub admin_entered_total_chips: Chips,
    pub denominations_count: BTreeMap<String, i64>,
    pub initiated_by: UserId,
    pub initiated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub user_id: UserId,
    pub chips_returned: Chips,
    pub chips: Chips,
    /// The session closed by this settlement, if one was active.
    pub session: Option<ClosedSession>,
    pub fee_billed: Money,
}

impl Lounge {
    /// Staff record the counted stack for a seated user.
    /// A second tally before confirmation replaces the first.
    pub fn initiate_settlement(
        &self,
        caller: Option<&Caller>,
        req: &InitiateSettlementRequest,
    ) -> LedgerResult<()> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let now = self.now();

        self.store.run_transaction(|tx| {
            let mut user = tx
                .user(&req.user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {}", req.user_id)))?;
            if !user.is_seated_at(&req.table_id, req.seat_number) {
                return Err(LedgerError::precondition(format!(
                    "user {} is not checked in at table {} seat {}",
                    req.user_id, req.table_id, req.seat_number
                )));
            }
            if let Some(previous) = &user.pending_chip_settlement {
                log::info!(
                    "settlement: replacing pending tally of {} for {} with {}",
                    previous.admin_entered_total_chips,
                    user.user_id,
                    req.total_admin_entered_chips,
                );
            }
            user.pending_chip_settlement = Some(PendingChipSettlement {
                table_id: req.table_id.clone(),
                seat_number: req.seat_number,
                admin_entered_total_chips: req.total_admin_entered_chips,
                denominations_count: req.denominations_count.clone(),
                initiated_by: caller.uid.clone(),
                initiated_at: now,
            });
            tx.update_user(&user)?;
            tx.append_event(
                &LedgerEvent::SettlementInitiated {
                    user_id: user.user_id.clone(),
                    table_id: req.table_id.clone(),
                    seat_number: req.seat_number,
                    total_chips: req.total_admin_entered_chips,
                    initiated_by: caller.uid.clone(),
                },
                now,
            )
        })?;

        log::info!(
            "settlement: {} tallied {} chips for {} at {}/{}",
            caller.uid,
            req.total_admin_entered_chips,
            req.user_id,
            req.table_id,
            req.seat_number,
        );
        Ok(())
    }

    /// The calling user accepts the pending tally and leaves the table.
    pub fn confirm_settlement(&self, caller: Option<&Caller>) -> LedgerResult<SettlementOutcome> {
        let caller = authorize(caller, Capability::SelfService)?;
        let user_id = caller.uid.as_str();
        let now = self.now();

        let (tally, chips, active_session) = self.store.run_transaction(|tx| {
            let mut user = tx
                .user(user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {user_id}")))?;
            let pending = user.pending_chip_settlement.take().ok_or_else(|| {
                LedgerError::precondition(format!("user {user_id} has no pending chip settlement"))
            })?;
            let tally = pending.admin_entered_total_chips;

            user.chips = user
                .chips
                .checked_add(tally)
                .ok_or_else(|| LedgerError::Internal("chip balance overflow".into()))?;
            user.chips_in_play = 0;
            if let (Some(table_id), Some(seat_number)) =
                (user.current_table_id.take(), user.current_seat_number.take())
            {
                match tx.seat(&table_id, seat_number)? {
                    Some(mut seat) if seat.is_held_by(user_id) => {
                        seat.vacate();
                        tx.update_seat(&seat)?;
                    }
                    _ => log::warn!(
                        "settlement: seat {table_id}/{seat_number} is not held by {user_id}, leaving it as is"
                    ),
                }
            }
            user.is_checked_in = false;
            user.checked_out_at = Some(now);

            tx.update_user(&user)?;
            tx.append_event(
                &LedgerEvent::SettlementConfirmed {
                    user_id: user_id.to_string(),
                    chips_returned: tally,
                },
                now,
            )?;
            Ok((tally, user.chips, user.active_game_session_id.clone()))
        })?;

        log::info!("settlement: {user_id} confirmed, {tally} chips returned (balance {chips})");

        let (session, fee_billed) = match active_session {
            Some(session_id) => self.close_and_bill(user_id, &session_id, tally, now),
            None => {
                self.flag_gap(
                    GapKind::SessionNotFound,
                    user_id,
                    None,
                    "settlement confirmed without an active game session, play fee not computed",
                );
                (None, 0)
            }
        };

        Ok(SettlementOutcome {
            user_id: user_id.to_string(),
            chips_returned: tally,
            chips,
            session,
            fee_billed,
        })
    }

    /// Close the user's session with the settled stack, bill any play fee
    /// and release the active session pointer.
    fn close_and_bill(
        &self,
        user_id: &str,
        session_id: &str,
        chips_out: Chips,
        at: DateTime<Utc>,
    ) -> (Option<ClosedSession>, Money) {
        let attempt = self.close_session(session_id, chips_out, at);
        let closed = match self.follow_up(GapKind::SessionCloseFailed, user_id, Some(session_id), attempt) {
            Some(Some(closed)) => closed,
            Some(None) => {
                self.flag_gap(
                    GapKind::SessionNotFound,
                    user_id,
                    Some(session_id),
                    "active session missing or already closed at settlement",
                );
                self.release_session(user_id, session_id, 0, at);
                return (None, 0);
            }
            None => return (None, 0),
        };

        let fee = closed.play_fee.max(0);
        if self.release_session(user_id, session_id, fee, at) {
            (Some(closed), fee)
        } else {
            (Some(closed), 0)
        }
    }

    /// Bill `fee` (if any) and clear the session pointer in one step.
    /// Returns false when the step failed and was queued.
    fn release_session(&self, user_id: &str, session_id: &str, fee: Money, at: DateTime<Utc>) -> bool {
        let released = self.store.run_transaction(|tx| {
            if fee > 0 {
                tx.increment_bill(user_id, fee)?;
                tx.append_event(
                    &LedgerEvent::PlayFeeBilled {
                        session_id: session_id.to_string(),
                        user_id: user_id.to_string(),
                        fee,
                    },
                    at,
                )?;
            }
            if !tx.clear_active_session(user_id, session_id)? {
                log::debug!("settlement: {user_id} already points at a newer session");
            }
            Ok(())
        });
        if released.is_ok() && fee > 0 {
            log::info!("settlement: billed play fee {fee} to {user_id} for session {session_id}");
        }
        self.follow_up(GapKind::FeePostFailed, user_id, Some(session_id), released)
            .is_some()
    }
}
