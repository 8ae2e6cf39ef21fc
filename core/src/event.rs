//! The ledger event log: an append-only audit trail of every movement.
//!
//! RULE: Events describe what already happened. They are written in the
//! same transaction as the mutation they describe, never afterwards.

use crate::{
    clock::from_millis,
    error::LedgerResult,
    types::{Chips, Money, OrderId, SeatNumber, SessionId, TableId, UserId, WithdrawalRequestId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Chip custody ───────────────────────────────
    ChipsPurchased {
        user_id: UserId,
        amount: Chips,
        charge: Money,
        sold_by: UserId,
    },
    CheckedIn {
        user_id: UserId,
        table_id: TableId,
        seat_number: SeatNumber,
        amount: Chips,
        checked_in_by: UserId,
    },
    WithdrawalRequested {
        request_id: WithdrawalRequestId,
        user_id: UserId,
        amount: Chips,
    },
    WithdrawalApproved {
        request_id: WithdrawalRequestId,
        user_id: UserId,
        processed_by: UserId,
    },
    WithdrawalRejected {
        request_id: WithdrawalRequestId,
        user_id: UserId,
        processed_by: UserId,
    },
    ChipsDispensed {
        request_id: WithdrawalRequestId,
        user_id: UserId,
        amount: Chips,
        processed_by: UserId,
    },
    WithdrawalReceived {
        request_id: WithdrawalRequestId,
        user_id: UserId,
    },

    // ── Settlement ─────────────────────────────────
    SettlementInitiated {
        user_id: UserId,
        table_id: TableId,
        seat_number: SeatNumber,
        total_chips: Chips,
        initiated_by: UserId,
    },
    SettlementConfirmed {
        user_id: UserId,
        chips_returned: Chips,
    },

    // ── Game sessions ──────────────────────────────
    SessionOpened {
        session_id: SessionId,
        user_id: UserId,
        table_id: TableId,
        seat_number: SeatNumber,
        buy_in: Chips,
    },
    BuyInAdded {
        session_id: SessionId,
        user_id: UserId,
        amount: Chips,
    },
    SessionClosed {
        session_id: SessionId,
        user_id: UserId,
        chips_out: Chips,
        profit: Chips,
        duration_minutes: i64,
        play_fee: Money,
    },
    PlayFeeBilled {
        session_id: SessionId,
        user_id: UserId,
        fee: Money,
    },

    // ── Orders ─────────────────────────────────────
    OrderPlaced {
        order_id: OrderId,
        user_id: UserId,
        item_count: usize,
    },
    OrderDelivered {
        order_id: OrderId,
        user_id: UserId,
    },
    OrderFinalized {
        order_id: OrderId,
        user_id: UserId,
        billed: Money,
    },
}

impl LedgerEvent {
    /// Stable name for the event_type column.
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::ChipsPurchased { .. }      => "chips_purchased",
            Self::CheckedIn { .. }           => "checked_in",
            Self::WithdrawalRequested { .. } => "withdrawal_requested",
            Self::WithdrawalApproved { .. }  => "withdrawal_approved",
            Self::WithdrawalRejected { .. }  => "withdrawal_rejected",
            Self::ChipsDispensed { .. }      => "chips_dispensed",
            Self::WithdrawalReceived { .. }  => "withdrawal_received",
            Self::SettlementInitiated { .. } => "settlement_initiated",
            Self::SettlementConfirmed { .. } => "settlement_confirmed",
            Self::SessionOpened { .. }       => "session_opened",
            Self::BuyInAdded { .. }          => "buy_in_added",
            Self::SessionClosed { .. }       => "session_closed",
            Self::PlayFeeBilled { .. }       => "play_fee_billed",
            Self::OrderPlaced { .. }         => "order_placed",
            Self::OrderDelivered { .. }      => "order_delivered",
            Self::OrderFinalized { .. }      => "order_finalized",
        }
    }

    /// The user whose ledger this event touches.
    pub fn user_id(&self) -> &str {
        match self {
            Self::ChipsPurchased { user_id, .. }
            | Self::CheckedIn { user_id, .. }
            | Self::WithdrawalRequested { user_id, .. }
            | Self::WithdrawalApproved { user_id, .. }
            | Self::WithdrawalRejected { user_id, .. }
            | Self::ChipsDispensed { user_id, .. }
            | Self::WithdrawalReceived { user_id, .. }
            | Self::SettlementInitiated { user_id, .. }
            | Self::SettlementConfirmed { user_id, .. }
            | Self::SessionOpened { user_id, .. }
            | Self::BuyInAdded { user_id, .. }
            | Self::SessionClosed { user_id, .. }
            | Self::PlayFeeBilled { user_id, .. }
            | Self::OrderPlaced { user_id, .. }
            | Self::OrderDelivered { user_id, .. }
            | Self::OrderFinalized { user_id, .. } => user_id,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub occurred_at: DateTime<Utc>,
    pub user_id: UserId,
    pub event_type: String,
    pub payload: String, // JSON-serialized LedgerEvent
}

impl EventLogEntry {
    pub fn new(event: &LedgerEvent, occurred_at: DateTime<Utc>) -> LedgerResult<Self> {
        Ok(Self {
            id: None,
            occurred_at,
            user_id: event.user_id().to_string(),
            event_type: event.event_type_name().to_string(),
            payload: serde_json::to_string(event)?,
        })
    }

    pub(crate) fn from_row(
        id: i64,
        occurred_at_ms: i64,
        user_id: String,
        event_type: String,
        payload: String,
    ) -> LedgerResult<Self> {
        Ok(Self {
            id: Some(id),
            occurred_at: from_millis(occurred_at_ms)?,
            user_id,
            event_type,
            payload,
        })
    }

    pub fn decode(&self) -> LedgerResult<LedgerEvent> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
