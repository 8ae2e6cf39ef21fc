//! Food and drink orders, and the bill they end up on.
//!
//! Chip purchases can travel on an order for display, but they were
//! billed when the chips were sold. Finalizing only bills drinks.

use crate::{
    auth::{authorize, ensure_owner_or_privileged, Caller, Capability},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    lounge::Lounge,
    request::{OrderRef, PlaceOrderRequest, Validate},
    types::{Money, OrderId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Drink,
    ChipPurchase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub kind: ItemKind,
    pub name: String,
    pub quantity: i64,
    pub unit_price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.quantity.saturating_mul(self.unit_price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Delivered,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending   => "pending",
            Self::Delivered => "delivered",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "pending"   => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "completed" => Ok(Self::Completed),
            other => Err(LedgerError::Internal(format!("unknown order status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
}

impl Order {
    /// What finalizing this order adds to the bill.
    pub fn drink_total(&self) -> Money {
        self.items
            .iter()
            .filter(|item| item.kind == ItemKind::Drink)
            .fold(0, |sum: Money, item| sum.saturating_add(item.line_total()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub billed: Money,
    pub bill: Money,
}

impl Lounge {
    /// The calling user orders for themselves.
    pub fn place_order(&self, caller: Option<&Caller>, req: &PlaceOrderRequest) -> LedgerResult<OrderId> {
        let caller = authorize(caller, Capability::SelfService)?;
        req.validate()?;
        let order_id = uuid::Uuid::new_v4().to_string();
        let now = self.now();

        self.store.run_transaction(|tx| {
            if tx.user(&caller.uid)?.is_none() {
                return Err(LedgerError::not_found(format!("user {}", caller.uid)));
            }
            tx.insert_order(&Order {
                order_id: order_id.clone(),
                user_id: caller.uid.clone(),
                items: req.items.clone(),
                status: OrderStatus::Pending,
                created_at: now,
                delivered_at: None,
                finalized_at: None,
            })?;
            tx.append_event(
                &LedgerEvent::OrderPlaced {
                    order_id: order_id.clone(),
                    user_id: caller.uid.clone(),
                    item_count: req.items.len(),
                },
                now,
            )
        })?;

        log::info!("orders: {} placed {order_id} with {} items", caller.uid, req.items.len());
        Ok(order_id)
    }

    pub fn mark_order_delivered(&self, caller: Option<&Caller>, req: &OrderRef) -> LedgerResult<()> {
        authorize(caller, Capability::ManageFloor)?;
        req.validate()?;
        let now = self.now();

        self.store.run_transaction(|tx| {
            let mut order = tx
                .order(&req.order_id)?
                .ok_or_else(|| LedgerError::not_found(format!("order {}", req.order_id)))?;
            if order.status != OrderStatus::Pending {
                return Err(LedgerError::precondition(format!(
                    "order {} is {}, only pending orders can be delivered",
                    order.order_id,
                    order.status.as_str()
                )));
            }
            order.status = OrderStatus::Delivered;
            order.delivered_at = Some(now);
            tx.update_order_status(&order)?;
            tx.append_event(
                &LedgerEvent::OrderDelivered {
                    order_id: order.order_id.clone(),
                    user_id: order.user_id.clone(),
                },
                now,
            )
        })?;

        log::debug!("orders: {} delivered", req.order_id);
        Ok(())
    }

    /// Close a delivered order and add its drinks to the owner's bill.
    pub fn finalize_order(&self, caller: Option<&Caller>, req: &OrderRef) -> LedgerResult<FinalizeOutcome> {
        let caller = authorize(caller, Capability::SelfService)?;
        req.validate()?;
        let now = self.now();

        let outcome = self.store.run_transaction(|tx| {
            let mut order = tx
                .order(&req.order_id)?
                .ok_or_else(|| LedgerError::not_found(format!("order {}", req.order_id)))?;
            ensure_owner_or_privileged(caller, &order.user_id, "order")?;
            if order.status != OrderStatus::Delivered {
                return Err(LedgerError::precondition(format!(
                    "order {} is {}, only delivered orders can be finalized",
                    order.order_id,
                    order.status.as_str()
                )));
            }
            let mut user = tx
                .user(&order.user_id)?
                .ok_or_else(|| LedgerError::not_found(format!("user {}", order.user_id)))?;

            let billed = order.drink_total();
            user.bill = user
                .bill
                .checked_add(billed)
                .ok_or_else(|| LedgerError::Internal("bill overflow".into()))?;
            order.status = OrderStatus::Completed;
            order.finalized_at = Some(now);

            tx.update_order_status(&order)?;
            tx.update_user(&user)?;
            tx.append_event(
                &LedgerEvent::OrderFinalized {
                    order_id: order.order_id.clone(),
                    user_id: order.user_id.clone(),
                    billed,
                },
                now,
            )?;
            Ok(FinalizeOutcome {
                order_id: order.order_id,
                user_id: order.user_id,
                billed,
                bill: user.bill,
            })
        })?;

        log::info!(
            "orders: finalized {} for {}, billed {} (bill {})",
            outcome.order_id,
            outcome.user_id,
            outcome.billed,
            outcome.bill,
        );
        Ok(outcome)
    }
}
