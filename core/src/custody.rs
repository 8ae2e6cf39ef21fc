//! Chip custody: moving chips between a user's balance, their in-play
//! stack and a table seat.
//!
//! STATES (derived from the user record):
//!   OffTable           not checked in
//!   Seated             checked in, chips in play at a seat
//!   SettlementPending  staff tallied the stack, awaiting user confirmation
//!
//! RULES:
//!   - Check-in and dispense only reclassify chips <-> chips_in_play.
//!     The sum changes only through purchase and settlement.
//!   - A user occupies at most one seat; a seat holds at most one user.

use crate::{
    auth::{authorize, Caller, Capability},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    lounge::Lounge,
    reconciliation::GapKind,
    request::{CheckInRequest, PurchaseChipsRequest, Validate, WithdrawalRef},
    settlement::PendingChipSettlement,
    types::{Chips, Money, SeatNumber, SessionId, TableId, UserId},
    withdrawal::WithdrawalStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: UserId,
    pub display_name: String,
    pub chips: Chips,
    pub chips_in_play: Chips,
    pub bill: Money,
    pub is_checked_in: bool,
    pub current_table_id: Option<TableId>,
    pub current_seat_number: Option<SeatNumber>,
    pub active_game_session_id: Option<SessionId>,
    pub pending_chip_settlement: Option<PendingChipSettlement>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodyState {
    OffTable,
    Seated,
    SettlementPending,
}

impl UserRecord {
    pub fn new(user_id: &str, display_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            chips: 0,
            chips_in_play: 0,
            bill: 0,
            is_checked_in: false,
            current_table_id: None,
            current_seat_number: None,
            active_game_session_id: None,
            pending_chip_settlement: None,
            checked_in_at: None,
            checked_out_at: None,
        }
    }

    pub fn custody_state(&self) -> CustodyState {
        if self.pending_chip_settlement.is_some() {
            CustodyState::SettlementPending
        } else if self.is_checked_in {
            CustodyState::Seated
        } else {
            CustodyState::OffTable
        }
    }

    pub fn is_seated_at(&self, table_id: &str, seat_number: SeatNumber) -> bool {
        self.is_checked_in
            && self.current_table_id.as_deref() == Some(table_id)
            && self.current_seat_number == Some(seat_number)
    }

    /// Chips the user holds in either form.
    pub fn total_chips(&self) -> Chips {
        self.chips + self.chips_in_play
    }

    /// Move chips from the balance to the in-play stack.
    fn stake(&mut self, amount: Chips) -> LedgerResult<()> {
        if self.chips < amount {
            return Err(LedgerError::precondition(format!(
                "user {} has {} chips, cannot put {amount} in play",
                self.user_id, self.chips
            )));
        }
        self.chips -= amount;
        self.chips_in_play = self
            .chips_in_play
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Internal("chips in play overflow".into()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub user_id: UserId,
    pub chips_in_play: Chips,
    pub remaining_chips: Chips,
    /// None when the session follow-up failed and was queued for reconciliation.
    pub session_id: Option<SessionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuyInRouting {
    AddedToSession(SessionId),
    OpenedSession(SessionId),
    /// Not recorded against any session; a reconciliation gap was queued.
    Unrouted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseOutcome {
    pub user_id: UserId,
    pub amount: Chips,
    pub chips_in_play: Chips,
    pub routing: BuyInRouting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub user_id: UserId,
    pub chips: Chips,
    pub charge: Money,
}

impl Lounge {
    /// Seat a user and put `amount_to_play` of their chips in play.
    pub fn check_in(
        &self,
        caller: Option<&Caller>,
        req: &CheckInRequest,
    ) -> LedgerResult<CheckInOutcome> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let now = self.now();

        let user = self.store.run_transaction(|tx| {
            let mut user = tx
                .user(&req.user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {}", req.user_id)))?;
            if user.is_checked_in {
                return Err(LedgerError::precondition(format!(
                    "user {} is already checked in at table {} seat {}",
                    user.user_id,
                    user.current_table_id.as_deref().unwrap_or("?"),
                    user.current_seat_number.unwrap_or_default(),
                )));
            }
            let mut seat = tx.seat(&req.table_id, req.seat_number)?.ok_or_else(|| {
                LedgerError::not_found(format!(
                    "seat {} at table {}",
                    req.seat_number, req.table_id
                ))
            })?;
            user.stake(req.amount_to_play)?;
            if seat.is_occupied() {
                return Err(LedgerError::precondition(format!(
                    "seat {} at table {} is occupied",
                    req.seat_number, req.table_id
                )));
            }

            user.is_checked_in = true;
            user.current_table_id = Some(req.table_id.clone());
            user.current_seat_number = Some(req.seat_number);
            user.active_game_session_id = None;
            user.checked_in_at = Some(now);
            seat.occupy(&user.user_id, req.amount_to_play);

            tx.update_user(&user)?;
            tx.update_seat(&seat)?;
            tx.append_event(
                &LedgerEvent::CheckedIn {
                    user_id: user.user_id.clone(),
                    table_id: req.table_id.clone(),
                    seat_number: req.seat_number,
                    amount: req.amount_to_play,
                    checked_in_by: caller.uid.clone(),
                },
                now,
            )?;
            Ok(user)
        })?;

        log::info!(
            "custody: {} checked in at {}/{} with {} chips (balance now {})",
            user.user_id,
            req.table_id,
            req.seat_number,
            req.amount_to_play,
            user.chips,
        );

        let session_id = self.open_and_attach(
            &user.user_id,
            &req.table_id,
            req.seat_number,
            req.amount_to_play,
        );

        Ok(CheckInOutcome {
            user_id: user.user_id,
            chips_in_play: user.chips_in_play,
            remaining_chips: user.chips,
            session_id,
        })
    }

    /// Deliver the chips of an approved withdrawal request to the table.
    pub fn dispense_additional_chips(
        &self,
        caller: Option<&Caller>,
        req: &WithdrawalRef,
    ) -> LedgerResult<DispenseOutcome> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let now = self.now();

        let (user, seat, amount) = self.store.run_transaction(|tx| {
            let mut request = tx.withdrawal(&req.withdrawal_request_id)?.ok_or_else(|| {
                LedgerError::not_found(format!(
                    "withdrawal request {}",
                    req.withdrawal_request_id
                ))
            })?;
            if request.status != WithdrawalStatus::ApprovedPreparing {
                return Err(LedgerError::precondition(format!(
                    "withdrawal request {} is {}, expected {}",
                    request.request_id,
                    request.status.as_str(),
                    WithdrawalStatus::ApprovedPreparing.as_str(),
                )));
            }
            let mut user = tx
                .user(&request.user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {}", request.user_id)))?;
            // Only a seated player's stack can grow.
            if user.custody_state() != CustodyState::Seated {
                return Err(LedgerError::precondition(format!(
                    "user {} is {:?}, chips can only be dispensed to a seated player",
                    user.user_id,
                    user.custody_state(),
                )));
            }
            let mut seat = match (user.current_table_id.as_deref(), user.current_seat_number) {
                (Some(table_id), Some(seat_number)) => tx
                    .seat(table_id, seat_number)?
                    .filter(|seat| seat.is_held_by(&user.user_id)),
                _ => None,
            }
            .ok_or_else(|| {
                LedgerError::precondition(format!(
                    "user {} does not hold the seat on record",
                    user.user_id
                ))
            })?;

            let amount = request.requested_chips_amount;
            user.stake(amount)?;
            seat.current_stack += amount;
            tx.update_seat(&seat)?;

            request.status = WithdrawalStatus::DeliveredAwaitingConfirmation;
            request.processed_by = Some(caller.uid.clone());
            request.processed_at = Some(now);

            tx.update_user(&user)?;
            tx.update_withdrawal(&request)?;
            tx.append_event(
                &LedgerEvent::ChipsDispensed {
                    request_id: request.request_id.clone(),
                    user_id: user.user_id.clone(),
                    amount,
                    processed_by: caller.uid.clone(),
                },
                now,
            )?;
            Ok((user, seat, amount))
        })?;

        log::info!(
            "custody: dispensed {amount} chips to {} for request {} (in play now {})",
            user.user_id,
            req.withdrawal_request_id,
            user.chips_in_play,
        );

        let routing = self.route_buy_in(&user, &seat.table_id, seat.seat_number, amount);
        Ok(DispenseOutcome {
            user_id: user.user_id,
            amount,
            chips_in_play: user.chips_in_play,
            routing,
        })
    }

    /// Sell chips over the counter: the balance grows, the bill is charged.
    pub fn purchase_chips(
        &self,
        caller: Option<&Caller>,
        req: &PurchaseChipsRequest,
    ) -> LedgerResult<PurchaseOutcome> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let charge = req
            .amount
            .checked_mul(self.config().chip_unit_price)
            .ok_or_else(|| LedgerError::invalid("purchase amount too large"))?;
        let now = self.now();

        let user = self.store.run_transaction(|tx| {
            let mut user = tx
                .user(&req.user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {}", req.user_id)))?;
            user.chips = user
                .chips
                .checked_add(req.amount)
                .ok_or_else(|| LedgerError::invalid("chip balance would overflow"))?;
            user.bill = user
                .bill
                .checked_add(charge)
                .ok_or_else(|| LedgerError::invalid("bill would overflow"))?;
            tx.update_user(&user)?;
            tx.append_event(
                &LedgerEvent::ChipsPurchased {
                    user_id: user.user_id.clone(),
                    amount: req.amount,
                    charge,
                    sold_by: caller.uid.clone(),
                },
                now,
            )?;
            Ok(user)
        })?;

        log::info!(
            "custody: sold {} chips to {} for {charge} (balance {}, bill {})",
            req.amount,
            user.user_id,
            user.chips,
            user.bill,
        );
        Ok(PurchaseOutcome {
            user_id: user.user_id,
            chips: user.chips,
            charge,
        })
    }

    /// Record dispensed chips against the user's game session, or open
    /// one at the seat the chips went to.
    ///
    /// The session is whatever is active now; it is not matched against
    /// the table the withdrawal was requested from.
    fn route_buy_in(
        &self,
        user: &UserRecord,
        table_id: &str,
        seat_number: SeatNumber,
        amount: Chips,
    ) -> BuyInRouting {
        match user.active_game_session_id.as_deref() {
            Some(session_id) => {
                let added = self.add_buy_in(session_id, amount);
                match self.follow_up(GapKind::BuyInFailed, &user.user_id, Some(session_id), added) {
                    Some(()) => BuyInRouting::AddedToSession(session_id.to_string()),
                    None => BuyInRouting::Unrouted,
                }
            }
            None => {
                log::info!(
                    "custody: {} has no active session, opening one for this buy-in",
                    user.user_id
                );
                match self.open_and_attach(&user.user_id, table_id, seat_number, amount) {
                    Some(session_id) => BuyInRouting::OpenedSession(session_id),
                    None => BuyInRouting::Unrouted,
                }
            }
        }
    }
}
