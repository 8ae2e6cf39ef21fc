use super::LedgerTx;
use crate::{
    clock::{from_millis, from_millis_opt, to_millis},
    error::{LedgerError, LedgerResult},
    orders::{Order, OrderItem, OrderStatus},
};
use rusqlite::{params, OptionalExtension};

impl LedgerTx<'_> {
    // ── Orders ────────────────────────────────────────────────────

    pub fn insert_order(&self, order: &Order) -> LedgerResult<()> {
        self.tx.execute(
            "INSERT INTO lounge_order (
                order_id, user_id, items, status, created_at, delivered_at, finalized_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                order.order_id,
                order.user_id,
                serde_json::to_string(&order.items)?,
                order.status.as_str(),
                to_millis(order.created_at),
                order.delivered_at.map(to_millis),
                order.finalized_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    pub fn order(&self, order_id: &str) -> LedgerResult<Option<Order>> {
        let raw = self
            .tx
            .query_row(
                "SELECT order_id, user_id, items, status, created_at, delivered_at, finalized_at
                 FROM lounge_order WHERE order_id = ?1",
                params![order_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                    ))
                },
            )
            .optional()?;
        let Some((order_id, user_id, items, status, created_at, delivered_at, finalized_at)) = raw
        else {
            return Ok(None);
        };
        let items: Vec<OrderItem> = serde_json::from_str(&items).map_err(|e| {
            LedgerError::Internal(format!("malformed items on order {order_id}: {e}"))
        })?;
        Ok(Some(Order {
            order_id,
            user_id,
            items,
            status: OrderStatus::parse(&status)?,
            created_at: from_millis(created_at)?,
            delivered_at: from_millis_opt(delivered_at)?,
            finalized_at: from_millis_opt(finalized_at)?,
        }))
    }

    pub fn update_order_status(&self, order: &Order) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE lounge_order SET status = ?1, delivered_at = ?2, finalized_at = ?3
             WHERE order_id = ?4",
            params![
                order.status.as_str(),
                order.delivered_at.map(to_millis),
                order.finalized_at.map(to_millis),
                order.order_id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!("order {}", order.order_id)));
        }
        Ok(())
    }
}
