//! Reconciliation: follow-up steps that did not complete, and a
//! read-only sweep that compares users, seats and sessions.
//!
//! Design:
//!   - Every failed follow-up (session open, close, fee billing, buy-in
//!     routing) is queued as a `reconciliation_gap` row.
//!   - `sweep` reports disagreements between the user record, the seat
//!     map and the session history. It never repairs anything.
//!   - Staff mark gaps resolved once they have fixed them by hand.

use crate::{
    auth::{authorize, Caller, Capability},
    error::{LedgerError, LedgerResult},
    lounge::Lounge,
    types::{Chips, SeatNumber, SessionId, TableId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    SessionOpenFailed,
    SessionNotFound,
    SessionCloseFailed,
    FeePostFailed,
    BuyInFailed,
}

impl GapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionOpenFailed  => "session_open_failed",
            Self::SessionNotFound    => "session_not_found",
            Self::SessionCloseFailed => "session_close_failed",
            Self::FeePostFailed      => "fee_post_failed",
            Self::BuyInFailed        => "buy_in_failed",
        }
    }

    pub fn parse(s: &str) -> LedgerResult<Self> {
        match s {
            "session_open_failed"  => Ok(Self::SessionOpenFailed),
            "session_not_found"    => Ok(Self::SessionNotFound),
            "session_close_failed" => Ok(Self::SessionCloseFailed),
            "fee_post_failed"      => Ok(Self::FeePostFailed),
            "buy_in_failed"        => Ok(Self::BuyInFailed),
            other => Err(LedgerError::Internal(format!("unknown gap kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationGap {
    pub gap_id: i64,
    pub detected_at: DateTime<Utc>,
    pub kind: GapKind,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub detail: String,
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum SweepFinding {
    /// An open session its user no longer points at.
    OrphanedOpenSession {
        session_id: SessionId,
        user_id: UserId,
    },
    /// Seated without any session recording the play.
    CheckedInWithoutSession { user_id: UserId },
    /// Chips counted as in play for a user who is not at a table.
    ChipsInPlayOffTable { user_id: UserId, chips_in_play: Chips },
    /// The seat map and the user record disagree.
    SeatMismatch {
        table_id: TableId,
        seat_number: SeatNumber,
        seat_user: Option<UserId>,
        user_id: UserId,
    },
    NegativeBalance {
        user_id: UserId,
        chips: Chips,
        chips_in_play: Chips,
    },
    UnresolvedGap { gap_id: i64, kind: GapKind, user_id: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked_at: DateTime<Utc>,
    pub findings: Vec<SweepFinding>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

impl Lounge {
    /// One consistent snapshot of the floor, checked for disagreements.
    pub fn sweep(&self) -> LedgerResult<SweepReport> {
        let findings = self.store.read(|tx| {
            let users = tx.all_users()?;
            let seats = tx.occupied_seats()?;
            let open_sessions = tx.open_sessions()?;
            let gaps = tx.unresolved_gaps()?;
            let mut findings = Vec::new();

            for session in &open_sessions {
                let still_active = users.iter().any(|u| {
                    u.user_id == session.user_id
                        && u.is_checked_in
                        && u.active_game_session_id.as_deref() == Some(session.session_id.as_str())
                });
                if !still_active {
                    findings.push(SweepFinding::OrphanedOpenSession {
                        session_id: session.session_id.clone(),
                        user_id: session.user_id.clone(),
                    });
                }
            }

            let seat_by_user: HashMap<&str, _> = seats
                .iter()
                .filter_map(|seat| seat.user_id.as_deref().map(|uid| (uid, seat)))
                .collect();

            for user in &users {
                if user.chips < 0 || user.chips_in_play < 0 {
                    findings.push(SweepFinding::NegativeBalance {
                        user_id: user.user_id.clone(),
                        chips: user.chips,
                        chips_in_play: user.chips_in_play,
                    });
                }
                if !user.is_checked_in {
                    if user.chips_in_play != 0 {
                        findings.push(SweepFinding::ChipsInPlayOffTable {
                            user_id: user.user_id.clone(),
                            chips_in_play: user.chips_in_play,
                        });
                    }
                    if let Some(seat) = seat_by_user.get(user.user_id.as_str()) {
                        findings.push(SweepFinding::SeatMismatch {
                            table_id: seat.table_id.clone(),
                            seat_number: seat.seat_number,
                            seat_user: seat.user_id.clone(),
                            user_id: user.user_id.clone(),
                        });
                    }
                    continue;
                }
                if user.active_game_session_id.is_none() {
                    findings.push(SweepFinding::CheckedInWithoutSession {
                        user_id: user.user_id.clone(),
                    });
                }
                if let (Some(table_id), Some(seat_number)) =
                    (user.current_table_id.as_deref(), user.current_seat_number)
                {
                    let seat = tx.seat(table_id, seat_number)?;
                    let seat_user = seat.as_ref().and_then(|s| s.user_id.clone());
                    if !seat.is_some_and(|s| s.is_held_by(&user.user_id)) {
                        findings.push(SweepFinding::SeatMismatch {
                            table_id: table_id.to_string(),
                            seat_number,
                            seat_user,
                            user_id: user.user_id.clone(),
                        });
                    }
                }
            }

            findings.extend(gaps.into_iter().map(|gap| SweepFinding::UnresolvedGap {
                gap_id: gap.gap_id,
                kind: gap.kind,
                user_id: gap.user_id,
            }));
            Ok(findings)
        })?;

        let report = SweepReport {
            checked_at: self.now(),
            findings,
        };
        if report.is_clean() {
            log::debug!("reconciliation: sweep clean");
        } else {
            log::warn!("reconciliation: sweep found {} issues", report.findings.len());
        }
        Ok(report)
    }

    pub fn open_gaps(&self) -> LedgerResult<Vec<ReconciliationGap>> {
        self.store.unresolved_gaps()
    }

    /// Staff mark a gap handled.
    pub fn resolve_gap(&self, caller: Option<&Caller>, gap_id: i64) -> LedgerResult<()> {
        let caller = authorize(caller, Capability::ManageFloor)?;
        self.store.run_transaction(|tx| tx.mark_gap_resolved(gap_id))?;
        log::info!("reconciliation: gap {gap_id} resolved by {}", caller.uid);
        Ok(())
    }
}
