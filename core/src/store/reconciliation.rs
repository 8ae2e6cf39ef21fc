use super::{LedgerStore, LedgerTx};
use crate::{
    clock::{from_millis, to_millis},
    error::{LedgerError, LedgerResult},
    reconciliation::{GapKind, ReconciliationGap},
};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl LedgerStore {
    // ── Reconciliation gaps ───────────────────────────────────────

    /// Queue a follow-up that did not complete. Returns the new gap id.
    pub fn record_gap(
        &self,
        kind: GapKind,
        user_id: &str,
        session_id: Option<&str>,
        detail: &str,
        detected_at: DateTime<Utc>,
    ) -> LedgerResult<i64> {
        self.run_transaction(|tx| {
            tx.tx.execute(
                "INSERT INTO reconciliation_gap (detected_at, kind, user_id, session_id, detail, resolved)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                params![to_millis(detected_at), kind.as_str(), user_id, session_id, detail],
            )?;
            Ok(tx.tx.last_insert_rowid())
        })
    }

    pub fn unresolved_gaps(&self) -> LedgerResult<Vec<ReconciliationGap>> {
        self.read(|tx| tx.unresolved_gaps())
    }
}

impl LedgerTx<'_> {
    pub fn unresolved_gaps(&self) -> LedgerResult<Vec<ReconciliationGap>> {
        let mut stmt = self.tx.prepare(
            "SELECT gap_id, detected_at, kind, user_id, session_id, detail, resolved
             FROM reconciliation_gap WHERE resolved = 0
             ORDER BY gap_id ASC",
        )?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, bool>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter()
            .map(|(gap_id, detected_at, kind, user_id, session_id, detail, resolved)| {
                Ok(ReconciliationGap {
                    gap_id,
                    detected_at: from_millis(detected_at)?,
                    kind: GapKind::parse(&kind)?,
                    user_id,
                    session_id,
                    detail,
                    resolved,
                })
            })
            .collect()
    }

    pub fn mark_gap_resolved(&self, gap_id: i64) -> LedgerResult<()> {
        let changed = self.tx.execute(
            "UPDATE reconciliation_gap SET resolved = 1 WHERE gap_id = ?1",
            params![gap_id],
        )?;
        if changed == 0 {
            return Err(LedgerError::not_found(format!("reconciliation gap {gap_id}")));
        }
        Ok(())
    }
}
