//! Remote callable surface: one entry point that decodes a named
//! operation's JSON payload, runs it and renders the outcome.
//!
//! Success is `{status: "success", message}`. Failure is `{code, message}`
//! with a kebab-case code the client can switch on.

use crate::{
    auth::Caller,
    custody::BuyInRouting,
    error::{ErrorCode, LedgerError, LedgerResult},
    lounge::Lounge,
    request::{
        CheckInRequest, InitiateSettlementRequest, OrderRef, PlaceOrderRequest,
        PurchaseChipsRequest, RequestWithdrawalRequest, WithdrawalRef,
    },
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResponse {
    pub status: String,
    pub message: String,
}

impl CallResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallFailure {
    pub code: ErrorCode,
    pub message: String,
}

impl From<LedgerError> for CallFailure {
    fn from(e: LedgerError) -> Self {
        let code = e.code();
        if code == ErrorCode::Internal {
            log::error!("callable: internal failure: {e}");
        }
        Self {
            code,
            message: e.to_string(),
        }
    }
}

fn decode<T: DeserializeOwned>(operation: &str, payload: serde_json::Value) -> LedgerResult<T> {
    serde_json::from_value(payload)
        .map_err(|e| LedgerError::invalid(format!("bad payload for {operation}: {e}")))
}

/// Run `operation` for `caller`. Unauthenticated calls are refused before
/// the payload is looked at.
pub fn dispatch(
    lounge: &Lounge,
    caller: Option<&Caller>,
    operation: &str,
    payload: serde_json::Value,
) -> Result<CallResponse, CallFailure> {
    if caller.is_none() {
        return Err(LedgerError::Unauthenticated.into());
    }
    log::debug!("callable: {operation}");
    run(lounge, caller, operation, payload)
        .map(CallResponse::success)
        .map_err(CallFailure::from)
}

fn run(
    lounge: &Lounge,
    caller: Option<&Caller>,
    operation: &str,
    payload: serde_json::Value,
) -> LedgerResult<String> {
    match operation {
        "checkIn" => {
            let req: CheckInRequest = decode(operation, payload)?;
            let out = lounge.check_in(caller, &req)?;
            Ok(format!(
                "{} checked in at table {} seat {} with {} chips, {} chips remaining",
                out.user_id, req.table_id, req.seat_number, out.chips_in_play, out.remaining_chips
            ))
        }
        "dispenseAdditionalChips" => {
            let req: WithdrawalRef = decode(operation, payload)?;
            let out = lounge.dispense_additional_chips(caller, &req)?;
            let routing = match &out.routing {
                BuyInRouting::AddedToSession(id) => format!("added to session {id}"),
                BuyInRouting::OpenedSession(id) => format!("opened session {id}"),
                BuyInRouting::Unrouted => "session bookkeeping pending".to_string(),
            };
            Ok(format!(
                "Dispensed {} chips to {}, {} now in play ({routing})",
                out.amount, out.user_id, out.chips_in_play
            ))
        }
        "initiateSettlement" => {
            let req: InitiateSettlementRequest = decode(operation, payload)?;
            lounge.initiate_settlement(caller, &req)?;
            Ok(format!(
                "Settlement of {} chips for {} awaiting confirmation",
                req.total_admin_entered_chips, req.user_id
            ))
        }
        "confirmSettlement" => {
            let out = lounge.confirm_settlement(caller)?;
            let mut message = format!(
                "{} chips returned to your balance, balance now {}",
                out.chips_returned, out.chips
            );
            if let Some(session) = &out.session {
                message.push_str(&format!(
                    ", played {} min, profit {}",
                    session.duration_minutes, session.profit
                ));
            }
            if out.fee_billed > 0 {
                message.push_str(&format!(", play fee {} added to bill", out.fee_billed));
            }
            Ok(message)
        }
        "finalizeOrder" => {
            let req: OrderRef = decode(operation, payload)?;
            let out = lounge.finalize_order(caller, &req)?;
            Ok(format!(
                "Order {} finalized, {} added to bill (bill now {})",
                out.order_id, out.billed, out.bill
            ))
        }
        "purchaseChips" => {
            let req: PurchaseChipsRequest = decode(operation, payload)?;
            let out = lounge.purchase_chips(caller, &req)?;
            Ok(format!(
                "Sold {} chips to {} for {}, balance now {}",
                req.amount, out.user_id, out.charge, out.chips
            ))
        }
        "requestWithdrawal" => {
            let req: RequestWithdrawalRequest = decode(operation, payload)?;
            let id = lounge.request_withdrawal(caller, &req)?;
            Ok(format!("Withdrawal request {id} for {} chips submitted", req.amount))
        }
        "approveWithdrawal" => {
            let req: WithdrawalRef = decode(operation, payload)?;
            lounge.approve_withdrawal(caller, &req)?;
            Ok(format!("Withdrawal request {} approved", req.withdrawal_request_id))
        }
        "rejectWithdrawal" => {
            let req: WithdrawalRef = decode(operation, payload)?;
            lounge.reject_withdrawal(caller, &req)?;
            Ok(format!("Withdrawal request {} rejected", req.withdrawal_request_id))
        }
        "confirmWithdrawalReceipt" => {
            let req: WithdrawalRef = decode(operation, payload)?;
            lounge.confirm_withdrawal_receipt(caller, &req)?;
            Ok(format!("Withdrawal request {} completed", req.withdrawal_request_id))
        }
        "placeOrder" => {
            let req: PlaceOrderRequest = decode(operation, payload)?;
            let id = lounge.place_order(caller, &req)?;
            Ok(format!("Order {id} placed with {} items", req.items.len()))
        }
        "markOrderDelivered" => {
            let req: OrderRef = decode(operation, payload)?;
            lounge.mark_order_delivered(caller, &req)?;
            Ok(format!("Order {} delivered", req.order_id))
        }
        other => Err(LedgerError::invalid(format!("unknown operation '{other}'"))),
    }
}
