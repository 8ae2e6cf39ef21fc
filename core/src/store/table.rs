use super::{LedgerStore, LedgerTx};
use crate::{
    config::TableConfig,
    error::{LedgerError, LedgerResult},
    types::{Chips, SeatNumber, TableId, UserId},
};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableRow {
    pub table_id: TableId,
    pub game_type: String,
    pub rate: String,
    pub min_buy_in: Chips,
    pub max_buy_in: Chips,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Empty,
    Occupied,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty    => "empty",
            Self::Occupied => "occupied",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "empty"    => Ok(Self::Empty),
            "occupied" => Ok(Self::Occupied),
            other      => Err(LedgerError::Internal(format!("unknown seat status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatRow {
    pub table_id: TableId,
    pub seat_number: SeatNumber,
    pub status: SeatStatus,
    pub user_id: Option<UserId>,
    pub current_stack: Chips,
}

impl SeatRow {
    pub fn is_occupied(&self) -> bool {
        self.status == SeatStatus::Occupied
    }

    pub fn is_held_by(&self, user_id: &str) -> bool {
        self.is_occupied() && self.user_id.as_deref() == Some(user_id)
    }

    pub fn occupy(&mut self, user_id: &str, stack: Chips) {
        self.status = SeatStatus::Occupied;
        self.user_id = Some(user_id.to_string());
        self.current_stack = stack;
    }

    pub fn vacate(&mut self) {
        self.status = SeatStatus::Empty;
        self.user_id = None;
        self.current_stack = 0;
    }
}

impl LedgerStore {
    // ── Table setup ──────────────────────────────────────────────

    /// Create or refresh a table and make sure all its seats exist.
    /// Existing seats keep their occupancy.
    pub fn upsert_table(&self, table: &TableConfig) -> LedgerResult<()> {
        self.run_transaction(|tx| {
            tx.tx.execute(
                "INSERT INTO poker_table (table_id, game_type, rate, min_buy_in, max_buy_in)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (table_id) DO UPDATE SET
                    game_type = excluded.game_type,
                    rate = excluded.rate,
                    min_buy_in = excluded.min_buy_in,
                    max_buy_in = excluded.max_buy_in",
                params![
                    table.table_id,
                    table.game_type,
                    table.rate,
                    table.min_buy_in,
                    table.max_buy_in,
                ],
            )?;
            for seat_number in 1..=table.seat_count {
                tx.tx.execute(
                    "INSERT INTO seat (table_id, seat_number, status, user_id, current_stack)
                     VALUES (?1, ?2, 'empty', NULL, 0)
                     ON CONFLICT (table_id, seat_number) DO NOTHING",
                    params![table.table_id, seat_number],
                )?;
            }
            Ok(())
        })
    }

    pub fn table(&self, table_id: &str) -> LedgerResult<Option<TableRow>> {
        self.read(|tx| tx.table(table_id))
    }
}

impl LedgerTx<'_> {
    pub fn table(&self, table_id: &str) -> LedgerResult<Option<TableRow>> {
        let row = self
            .tx
            .query_row(
                "SELECT table_id, game_type, rate, min_buy_in, max_buy_in
                 FROM poker_table WHERE table_id = ?1",
                params![table_id],
                |row| {
                    Ok(TableRow {
                        table_id: row.get(0)?,
                        game_type: row.get(1)?,
                        rate: row.get(2)?,
                        min_buy_in: row.get(3)?,
                        max_buy_in: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    // ── Seat ──────────────────────────────────────────────────────

    pub fn seat(&self, table_id: &str, seat_number: SeatNumber) -> LedgerResult<Option<SeatRow>> {
        let raw = self
            .tx
            .query_row(
                "SELECT table_id, seat_number, status, user_id, current_stack
                 FROM seat WHERE table_id = ?1 AND seat_number = ?2",
                params![table_id, seat_number],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()?;
        raw.map(|(table_id, seat_number, status, user_id, current_stack)| {
            Ok(SeatRow {
                table_id,
                seat_number,
                status: SeatStatus::parse(&status)?,
                user_id,
                current_stack,
            })
        })
        .transpose()
    }

    pub fn occupied_seats(&self) -> LedgerResult<Vec<SeatRow>> {
        let mut stmt = self.tx.prepare(
            "SELECT table_id, seat_number, status, user_id, current_stack
             FROM seat WHERE status = 'occupied' OR user_id IS NOT NULL
             ORDER BY table_id, seat_number",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(table_id, seat_number, status, user_id, current_stack)| {
                Ok(SeatRow {
                    table_id,
                    seat_number,
                    status: SeatStatus::parse(&status)?,
                    user_id,
                    current_stack,
                })
            })
            .collect()
    }

    pub fn update_seat(&self, seat: &SeatRow) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE seat SET status = ?1, user_id = ?2, current_stack = ?3
             WHERE table_id = ?4 AND seat_number = ?5",
            params![
                seat.status.as_str(),
                seat.user_id,
                seat.current_stack,
                seat.table_id,
                seat.seat_number,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!(
                "seat {} at table {}",
                seat.seat_number, seat.table_id
            )));
        }
        Ok(())
    }
}
