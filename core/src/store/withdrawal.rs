use super::LedgerTx;
use crate::{
    clock::{from_millis, from_millis_opt, to_millis},
    error::{LedgerError, LedgerResult},
    withdrawal::{WithdrawalRequest, WithdrawalStatus},
};
use rusqlite::{params, OptionalExtension};

impl LedgerTx<'_> {
    // ── Withdrawal requests ───────────────────────────────────────

    pub fn insert_withdrawal(&self, w: &WithdrawalRequest) -> LedgerResult<()> {
        self.tx.execute(
            "INSERT INTO withdrawal_request (
                request_id, user_id, table_id, seat_number, requested_chips_amount,
                status, requested_at, processed_by, processed_at, confirmed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                w.request_id,
                w.user_id,
                w.table_id,
                w.seat_number,
                w.requested_chips_amount,
                w.status.as_str(),
                to_millis(w.requested_at),
                w.processed_by,
                w.processed_at.map(to_millis),
                w.confirmed_at.map(to_millis),
            ],
        )?;
        Ok(())
    }

    pub fn withdrawal(&self, request_id: &str) -> LedgerResult<Option<WithdrawalRequest>> {
        let raw = self
            .tx
            .query_row(
                "SELECT request_id, user_id, table_id, seat_number, requested_chips_amount,
                        status, requested_at, processed_by, processed_at, confirmed_at
                 FROM withdrawal_request WHERE request_id = ?1",
                params![request_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<i64>>(8)?,
                        row.get::<_, Option<i64>>(9)?,
                    ))
                },
            )
            .optional()?;
        let Some((
            request_id,
            user_id,
            table_id,
            seat_number,
            requested_chips_amount,
            status,
            requested_at,
            processed_by,
            processed_at,
            confirmed_at,
        )) = raw
        else {
            return Ok(None);
        };
        Ok(Some(WithdrawalRequest {
            request_id,
            user_id,
            table_id,
            seat_number,
            requested_chips_amount,
            status: WithdrawalStatus::parse(&status)?,
            requested_at: from_millis(requested_at)?,
            processed_by,
            processed_at: from_millis_opt(processed_at)?,
            confirmed_at: from_millis_opt(confirmed_at)?,
        }))
    }

    pub fn update_withdrawal(&self, w: &WithdrawalRequest) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE withdrawal_request SET
                status = ?1, processed_by = ?2, processed_at = ?3, confirmed_at = ?4
             WHERE request_id = ?5",
            params![
                w.status.as_str(),
                w.processed_by,
                w.processed_at.map(to_millis),
                w.confirmed_at.map(to_millis),
                w.request_id,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!(
                "withdrawal request {}",
                w.request_id
            )));
        }
        Ok(())
    }
}
