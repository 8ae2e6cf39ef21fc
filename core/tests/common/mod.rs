//! Shared floor fixture for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use lounge_core::{
    auth::Caller,
    clock::ManualClock,
    custody::{CheckInOutcome, DispenseOutcome, UserRecord},
    error::LedgerResult,
    fee::FeePolicy,
    lounge::Lounge,
    request::{
        CheckInRequest, InitiateSettlementRequest, PurchaseChipsRequest,
        RequestWithdrawalRequest, WithdrawalRef,
    },
    settlement::SettlementOutcome,
    types::Chips,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn opening_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 20, 0, 0).unwrap()
}

pub struct Floor {
    pub lounge: Lounge,
    pub clock: Arc<ManualClock>,
    pub staff: Caller,
}

impl Floor {
    pub fn new() -> Self {
        init_logging();
        let clock = Arc::new(ManualClock::new(opening_time()));
        let lounge = Lounge::build_test(clock.clone()).unwrap();
        Self {
            lounge,
            clock,
            staff: Caller::staff("staff-1"),
        }
    }

    /// Same floor, billing play time with `fees` instead of the configured rule.
    pub fn with_fee_policy(fees: Box<dyn FeePolicy>) -> Self {
        let Self { lounge, clock, staff } = Self::new();
        Self {
            lounge: lounge.with_fee_policy(fees),
            clock,
            staff,
        }
    }

    /// Register a player and sell them `chips` over the counter.
    pub fn player_with_chips(&self, uid: &str, chips: Chips) -> Caller {
        self.lounge.register_user(uid, uid).unwrap();
        if chips > 0 {
            self.lounge
                .purchase_chips(
                    Some(&self.staff),
                    &PurchaseChipsRequest {
                        user_id: uid.into(),
                        amount: chips,
                    },
                )
                .unwrap();
        }
        Caller::player(uid)
    }

    pub fn user(&self, uid: &str) -> UserRecord {
        self.lounge.store.user(uid).unwrap().unwrap()
    }

    pub fn check_in(
        &self,
        uid: &str,
        table_id: &str,
        seat_number: i64,
        amount: Chips,
    ) -> LedgerResult<CheckInOutcome> {
        self.lounge.check_in(
            Some(&self.staff),
            &CheckInRequest {
                user_id: uid.into(),
                table_id: table_id.into(),
                seat_number,
                amount_to_play: amount,
            },
        )
    }

    pub fn tally(&self, uid: &str, table_id: &str, seat_number: i64, total: Chips) -> LedgerResult<()> {
        self.lounge.initiate_settlement(
            Some(&self.staff),
            &InitiateSettlementRequest {
                user_id: uid.into(),
                table_id: table_id.into(),
                seat_number,
                denominations_count: BTreeMap::from([("1".to_string(), total)]),
                total_admin_entered_chips: total,
            },
        )
    }

    /// Staff tally followed by the player's confirmation.
    pub fn settle(
        &self,
        uid: &str,
        table_id: &str,
        seat_number: i64,
        total: Chips,
    ) -> LedgerResult<SettlementOutcome> {
        self.tally(uid, table_id, seat_number, total)?;
        self.lounge.confirm_settlement(Some(&Caller::player(uid)))
    }

    /// Request and approve a withdrawal, ready to dispense.
    pub fn approved_withdrawal(&self, uid: &str, amount: Chips) -> WithdrawalRef {
        let request_id = self
            .lounge
            .request_withdrawal(Some(&Caller::player(uid)), &RequestWithdrawalRequest { amount })
            .unwrap();
        let req = WithdrawalRef {
            withdrawal_request_id: request_id,
        };
        self.lounge.approve_withdrawal(Some(&self.staff), &req).unwrap();
        req
    }

    /// Full withdrawal path up to the chips reaching the table.
    pub fn dispense(&self, uid: &str, amount: Chips) -> LedgerResult<DispenseOutcome> {
        let req = self.approved_withdrawal(uid, amount);
        self.lounge.dispense_additional_chips(Some(&self.staff), &req)
    }
}
