//! Withdrawal requests: a seated player asking for more of their own
//! chips at the table.
//!
//! LIFECYCLE:
//!   pending -> approved_preparing -> delivered_awaiting_confirmation -> completed
//!   pending -> rejected
//!
//! Only the dispense step (custody) moves chips. The other transitions
//! are bookkeeping.

use crate::{
    auth::{authorize, ensure_owner_or_privileged, Caller, Capability},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    lounge::Lounge,
    request::{RequestWithdrawalRequest, Validate, WithdrawalRef},
    types::{Chips, SeatNumber, TableId, UserId, WithdrawalRequestId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    ApprovedPreparing,
    DeliveredAwaitingConfirmation,
    Completed,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending                       => "pending",
            Self::ApprovedPreparing             => "approved_preparing",
            Self::DeliveredAwaitingConfirmation => "delivered_awaiting_confirmation",
            Self::Completed                     => "completed",
            Self::Rejected                      => "rejected",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "pending"                         => Ok(Self::Pending),
            "approved_preparing"              => Ok(Self::ApprovedPreparing),
            "delivered_awaiting_confirmation" => Ok(Self::DeliveredAwaitingConfirmation),
            "completed"                       => Ok(Self::Completed),
            "rejected"                        => Ok(Self::Rejected),
            other => Err(LedgerError::Internal(format!(
                "unknown withdrawal status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub request_id: WithdrawalRequestId,
    pub user_id: UserId,
    /// Where the user sat when asking.
    pub table_id: Option<TableId>,
    pub seat_number: Option<SeatNumber>,
    pub requested_chips_amount: Chips,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

fn expect_status(request: &WithdrawalRequest, expected: WithdrawalStatus) -> LedgerResult<()> {
    if request.status != expected {
        return Err(LedgerError::precondition(format!(
            "withdrawal request {} is {}, expected {}",
            request.request_id,
            request.status.as_str(),
            expected.as_str(),
        )));
    }
    Ok(())
}

impl Lounge {
    /// The calling user asks for `amount` more chips from their balance.
    pub fn request_withdrawal(
        &self,
        caller: Option<&Caller>,
        req: &RequestWithdrawalRequest,
    ) -> LedgerResult<WithdrawalRequestId> {
        let caller = authorize(caller, Capability::SelfService)?;
        req.validate()?;
        let user_id = caller.uid.as_str();
        let request_id = uuid::Uuid::new_v4().to_string();
        let now = self.now();

        self.store.run_transaction(|tx| {
            let user = tx
                .user(user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {user_id}")))?;
            if !user.is_checked_in {
                return Err(LedgerError::precondition(format!(
                    "user {user_id} must be checked in to request chips"
                )));
            }
            if user.pending_chip_settlement.is_some() {
                return Err(LedgerError::precondition(format!(
                    "user {user_id} has a settlement awaiting confirmation"
                )));
            }
            if user.chips < req.amount {
                return Err(LedgerError::precondition(format!(
                    "user {user_id} has {} chips, cannot request {}",
                    user.chips, req.amount
                )));
            }
            tx.insert_withdrawal(&WithdrawalRequest {
                request_id: request_id.clone(),
                user_id: user_id.to_string(),
                table_id: user.current_table_id.clone(),
                seat_number: user.current_seat_number,
                requested_chips_amount: req.amount,
                status: WithdrawalStatus::Pending,
                requested_at: now,
                processed_by: None,
                processed_at: None,
                confirmed_at: None,
            })?;
            tx.append_event(
                &LedgerEvent::WithdrawalRequested {
                    request_id: request_id.clone(),
                    user_id: user_id.to_string(),
                    amount: req.amount,
                },
                now,
            )
        })?;

        log::info!("withdrawal: {user_id} requested {} chips ({request_id})", req.amount);
        Ok(request_id)
    }

    pub fn approve_withdrawal(&self, caller: Option<&Caller>, req: &WithdrawalRef) -> LedgerResult<()> {
        self.decide_withdrawal(caller, req, WithdrawalStatus::ApprovedPreparing)
    }

    pub fn reject_withdrawal(&self, caller: Option<&Caller>, req: &WithdrawalRef) -> LedgerResult<()> {
        self.decide_withdrawal(caller, req, WithdrawalStatus::Rejected)
    }

    fn decide_withdrawal(
        &self,
        caller: Option<&Caller>,
        req: &WithdrawalRef,
        decision: WithdrawalStatus,
    ) -> LedgerResult<()> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let now = self.now();

        self.store.run_transaction(|tx| {
            let mut request = tx.withdrawal(&req.withdrawal_request_id)?.ok_or_else(|| {
                LedgerError::not_found(format!("withdrawal request {}", req.withdrawal_request_id))
            })?;
            expect_status(&request, WithdrawalStatus::Pending)?;
            request.status = decision;
            request.processed_by = Some(caller.uid.clone());
            request.processed_at = Some(now);
            tx.update_withdrawal(&request)?;

            let event = match decision {
                WithdrawalStatus::Rejected => LedgerEvent::WithdrawalRejected {
                    request_id: request.request_id.clone(),
                    user_id: request.user_id.clone(),
                    processed_by: caller.uid.clone(),
                },
                _ => LedgerEvent::WithdrawalApproved {
                    request_id: request.request_id.clone(),
                    user_id: request.user_id.clone(),
                    processed_by: caller.uid.clone(),
                },
            };
            tx.append_event(&event, now)
        })?;

        log::info!(
            "withdrawal: {} marked {} by {}",
            req.withdrawal_request_id,
            decision.as_str(),
            caller.uid
        );
        Ok(())
    }

    /// The requesting user acknowledges the chips arrived.
    pub fn confirm_withdrawal_receipt(
        &self,
        caller: Option<&Caller>,
        req: &WithdrawalRef,
    ) -> LedgerResult<()> {
        let caller = authorize(caller, Capability::SelfService)?;
        req.validate()?;
        let now = self.now();

        self.store.run_transaction(|tx| {
            let mut request = tx.withdrawal(&req.withdrawal_request_id)?.ok_or_else(|| {
                LedgerError::not_found(format!("withdrawal request {}", req.withdrawal_request_id))
            })?;
            ensure_owner_or_privileged(caller, &request.user_id, "withdrawal request")?;
            expect_status(&request, WithdrawalStatus::DeliveredAwaitingConfirmation)?;
            request.status = WithdrawalStatus::Completed;
            request.confirmed_at = Some(now);
            tx.update_withdrawal(&request)?;
            tx.append_event(
                &LedgerEvent::WithdrawalReceived {
                    request_id: request.request_id.clone(),
                    user_id: request.user_id.clone(),
                },
                now,
            )
        })?;

        log::debug!("withdrawal: {} completed", req.withdrawal_request_id);
        Ok(())
    }
}
