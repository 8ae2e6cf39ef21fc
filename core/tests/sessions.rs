//! Game session recorder: opening, buy-ins, closing and fee computation.

mod common;

use common::Floor;
use lounge_core::{
    config::TableConfig,
    custody::BuyInRouting,
    error::ErrorCode,
    fee::{FeeContext, FeePolicy},
    types::{Chips, Money},
};
use std::sync::{Arc, Mutex};

#[test]
fn session_snapshots_the_table() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 1_000);
    let out = floor.check_in("alice", "T2", 1, 500).unwrap();

    let session = floor
        .lounge
        .store
        .session(&out.session_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(session.is_open());
    assert_eq!(session.user_id, "alice");
    assert_eq!(session.table_id, "T2");
    assert_eq!(session.seat_number, 1);
    assert_eq!(session.game_type_played, "PLO");
    assert_eq!(session.rate_played, "2/5");
    assert_eq!(session.min_buy_in, 300);
    assert_eq!(session.max_buy_in, 3_000);
    assert_eq!(session.session_start_time, common::opening_time());
    assert_eq!(session.chips_in, 500);
    assert_eq!(session.additional_chips_in, 0);
    assert_eq!(session.total_chips_in, 500);
    assert_eq!(session.chips_out, None);
    assert_eq!(session.play_fee_calculated, None);
}

#[test]
fn buy_ins_accumulate_on_the_active_session() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 2_000);
    let session_id = floor.check_in("alice", "T1", 3, 200).unwrap().session_id.unwrap();

    for amount in [150, 75, 300] {
        let out = floor.dispense("alice", amount).unwrap();
        assert_eq!(out.routing, BuyInRouting::AddedToSession(session_id.clone()));
    }

    let session = floor.lounge.store.session(&session_id).unwrap().unwrap();
    assert_eq!(session.chips_in, 200);
    assert_eq!(session.additional_chips_in, 525);
    assert_eq!(session.total_chips_in, 725);

    let user = floor.user("alice");
    assert_eq!(user.chips_in_play, 725);
    assert_eq!(user.chips, 2_000 - 725);
    let seat = floor.lounge.store.seat("T1", 3).unwrap().unwrap();
    assert_eq!(seat.current_stack, 725);
}

#[test]
fn buy_in_on_missing_or_closed_session_fails() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 500);
    let session_id = floor.check_in("alice", "T1", 1, 100).unwrap().session_id.unwrap();

    let err = floor.lounge.add_buy_in("no-such-session", 50).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);

    floor
        .lounge
        .close_session(&session_id, 100, floor.lounge.now())
        .unwrap()
        .unwrap();
    let err = floor.lounge.add_buy_in(&session_id, 50).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FailedPrecondition);

    let session = floor.lounge.store.session(&session_id).unwrap().unwrap();
    assert_eq!(session.total_chips_in, 100);
}

#[test]
fn closing_twice_is_a_quiet_no_op() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 500);
    let session_id = floor.check_in("alice", "T1", 1, 100).unwrap().session_id.unwrap();

    floor.clock.advance_minutes(10);
    let first = floor
        .lounge
        .close_session(&session_id, 180, floor.lounge.now())
        .unwrap()
        .unwrap();
    assert_eq!(first.profit, 80);
    assert_eq!(first.duration_minutes, 10);
    assert_eq!(first.play_fee, 500);

    floor.clock.advance_minutes(50);
    let second = floor
        .lounge
        .close_session(&session_id, 9_999, floor.lounge.now())
        .unwrap();
    assert!(second.is_none());

    let session = floor.lounge.store.session(&session_id).unwrap().unwrap();
    assert_eq!(session.chips_out, Some(180));
    assert_eq!(session.duration_minutes, Some(10));

    assert!(floor
        .lounge
        .close_session("never-opened", 0, floor.lounge.now())
        .unwrap()
        .is_none());
}

#[test]
fn opening_on_an_unknown_table_is_not_found() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 0);
    let err = floor.lounge.open_session("alice", "T9", 1, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn fee_follows_half_hour_blocks_through_settlement() {
    for (minutes, fee) in [(0, 0), (1, 500), (29, 500), (30, 500), (31, 1_000), (60, 1_000), (61, 1_500)] {
        let floor = Floor::new();
        floor.player_with_chips("alice", 1_000);
        floor.check_in("alice", "T1", 1, 400).unwrap();
        floor.clock.advance_minutes(minutes);

        let out = floor.settle("alice", "T1", 1, 400).unwrap();
        let closed = out.session.expect("session should close");
        assert_eq!(closed.duration_minutes, minutes, "duration for {minutes} min");
        assert_eq!(closed.play_fee, fee, "fee for {minutes} min");
        assert_eq!(out.fee_billed, fee);
        // 1_000 from the chip sale plus the fee.
        assert_eq!(floor.user("alice").bill, 1_000 + fee);
    }
}

#[test]
fn free_session_still_releases_the_pointer() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 1_000);
    let session_id = floor.check_in("alice", "T1", 1, 400).unwrap().session_id.unwrap();

    let out = floor.settle("alice", "T1", 1, 350).unwrap();
    assert_eq!(out.fee_billed, 0);

    let user = floor.user("alice");
    assert_eq!(user.active_game_session_id, None);
    let session = floor.lounge.store.session(&session_id).unwrap().unwrap();
    assert_eq!(session.profit, Some(-50));
    assert!(!session.play_fee_applied_to_bill);
}

#[test]
fn each_visit_gets_its_own_session() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 1_000);

    let first = floor.check_in("alice", "T1", 1, 200).unwrap().session_id.unwrap();
    floor.clock.advance_minutes(20);
    floor.settle("alice", "T1", 1, 250).unwrap();
    floor.clock.advance_minutes(5);
    let second = floor.check_in("alice", "T2", 2, 300).unwrap().session_id.unwrap();

    assert_ne!(first, second);
    let sessions = floor.lounge.store.sessions_for_user("alice").unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(!sessions[0].is_open());
    assert!(sessions[1].is_open());
    assert_eq!(floor.user("alice").active_game_session_id, Some(second));
}

/// What a fee rule was shown at close.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SeenContext {
    duration_minutes: i64,
    game_type: String,
    rate: String,
    min_buy_in: Chips,
    max_buy_in: Chips,
}

/// Flat fee per game and stake, remembering every context it priced.
struct StakeFee {
    seen: Arc<Mutex<Vec<SeenContext>>>,
}

impl FeePolicy for StakeFee {
    fn play_fee(&self, ctx: &FeeContext<'_>) -> Money {
        self.seen.lock().unwrap().push(SeenContext {
            duration_minutes: ctx.duration_minutes,
            game_type: ctx.game_type.to_string(),
            rate: ctx.rate.to_string(),
            min_buy_in: ctx.min_buy_in,
            max_buy_in: ctx.max_buy_in,
        });
        match (ctx.game_type, ctx.rate) {
            ("PLO", "2/5") => 2_000,
            _ => 100,
        }
    }
}

#[test]
fn custom_fee_policy_prices_the_table_as_it_was_when_play_began() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let floor = Floor::with_fee_policy(Box::new(StakeFee { seen: seen.clone() }));
    floor.player_with_chips("alice", 1_000);
    floor.check_in("alice", "T2", 1, 500).unwrap();

    // The floor manager turns T2 into a cheaper game mid-session.
    floor
        .lounge
        .store
        .upsert_table(&TableConfig {
            table_id: "T2".into(),
            game_type: "NLH".into(),
            rate: "1/2".into(),
            min_buy_in: 100,
            max_buy_in: 1_000,
            seat_count: 6,
        })
        .unwrap();
    floor.clock.advance_minutes(45);

    let out = floor.settle("alice", "T2", 1, 500).unwrap();
    assert_eq!(out.fee_billed, 2_000);
    assert_eq!(out.session.unwrap().play_fee, 2_000);
    assert_eq!(floor.user("alice").bill, 1_000 + 2_000);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![SeenContext {
            duration_minutes: 45,
            game_type: "PLO".into(),
            rate: "2/5".into(),
            min_buy_in: 300,
            max_buy_in: 3_000,
        }]
    );

    // New sessions see the new table.
    floor.check_in("alice", "T2", 1, 500).unwrap();
    floor.clock.advance_minutes(10);
    assert_eq!(floor.settle("alice", "T2", 1, 500).unwrap().fee_billed, 100);
}
