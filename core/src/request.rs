//! Typed request records for every callable operation.
//!
//! Field names follow the callable wire format (camelCase). Each record
//! validates itself before the operation touches the store.

use crate::{
    error::{LedgerError, LedgerResult},
    orders::OrderItem,
    types::{Chips, OrderId, SeatNumber, TableId, UserId, WithdrawalRequestId},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub trait Validate {
    fn validate(&self) -> LedgerResult<()>;
}

fn require_id(field: &str, value: &str) -> LedgerResult<()> {
    if value.trim().is_empty() {
        return Err(LedgerError::invalid(format!("{field} is required")));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: i64) -> LedgerResult<()> {
    if value < 0 {
        return Err(LedgerError::invalid(format!(
            "{field} must be zero or more, got {value}"
        )));
    }
    Ok(())
}

fn require_positive(field: &str, value: i64) -> LedgerResult<()> {
    if value <= 0 {
        return Err(LedgerError::invalid(format!(
            "{field} must be greater than zero, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub user_id: UserId,
    pub table_id: TableId,
    pub seat_number: SeatNumber,
    pub amount_to_play: Chips,
}

impl Validate for CheckInRequest {
    fn validate(&self) -> LedgerResult<()> {
        require_id("userId", &self.user_id)?;
        require_id("tableId", &self.table_id)?;
        require_positive("seatNumber", self.seat_number)?;
        require_non_negative("amountToPlay", self.amount_to_play)
    }
}

/// Names a withdrawal request. Used by dispense, approve, reject and
/// receipt confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRef {
    pub withdrawal_request_id: WithdrawalRequestId,
}

impl Validate for WithdrawalRef {
    fn validate(&self) -> LedgerResult<()> {
        require_id("withdrawalRequestId", &self.withdrawal_request_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateSettlementRequest {
    pub user_id: UserId,
    pub table_id: TableId,
    pub seat_number: SeatNumber,
    #[serde(default)]
    pub denominations_count: BTreeMap<String, i64>,
    pub total_admin_entered_chips: Chips,
}

impl Validate for InitiateSettlementRequest {
    fn validate(&self) -> LedgerResult<()> {
        require_id("userId", &self.user_id)?;
        require_id("tableId", &self.table_id)?;
        require_non_negative("seatNumber", self.seat_number)?;
        require_non_negative("totalAdminEnteredChips", self.total_admin_entered_chips)?;
        for (denomination, count) in &self.denominations_count {
            require_id("denominationsCount key", denomination)?;
            require_non_negative(&format!("denominationsCount[{denomination}]"), *count)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: OrderId,
}

impl Validate for OrderRef {
    fn validate(&self) -> LedgerResult<()> {
        require_id("orderId", &self.order_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseChipsRequest {
    pub user_id: UserId,
    pub amount: Chips,
}

impl Validate for PurchaseChipsRequest {
    fn validate(&self) -> LedgerResult<()> {
        require_id("userId", &self.user_id)?;
        require_positive("amount", self.amount)
    }
}

/// A seated player asking for more chips from their balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithdrawalRequest {
    pub amount: Chips,
}

impl Validate for RequestWithdrawalRequest {
    fn validate(&self) -> LedgerResult<()> {
        require_positive("amount", self.amount)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderItem>,
}

impl Validate for PlaceOrderRequest {
    fn validate(&self) -> LedgerResult<()> {
        if self.items.is_empty() {
            return Err(LedgerError::invalid("an order needs at least one item"));
        }
        for item in &self.items {
            require_id("item name", &item.name)?;
            require_positive(&format!("quantity of {}", item.name), item.quantity)?;
            require_non_negative(&format!("unitPrice of {}", item.name), item.unit_price)?;
        }
        Ok(())
    }
}
