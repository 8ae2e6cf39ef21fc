//! End-to-end floor scenarios and chip conservation.

mod common;

use common::Floor;
use lounge_core::store::SeatStatus;

/// One evening for one player: check in, tally, confirm 45 minutes later.
#[test]
fn forty_five_minutes_at_table_one() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 1_000);
    let bill_before = floor.user("alice").bill;

    let out = floor.check_in("alice", "T1", 2, 400).unwrap();
    let s1 = out.session_id.unwrap();
    let user = floor.user("alice");
    assert_eq!((user.chips, user.chips_in_play), (600, 400));
    let seat = floor.lounge.store.seat("T1", 2).unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Occupied);
    let session = floor.lounge.store.session(&s1).unwrap().unwrap();
    assert_eq!(session.total_chips_in, 400);

    floor.tally("alice", "T1", 2, 900).unwrap();
    assert!(floor.user("alice").pending_chip_settlement.is_some());

    floor.clock.advance_minutes(45);
    let out = floor
        .lounge
        .confirm_settlement(Some(&lounge_core::auth::Caller::player("alice")))
        .unwrap();

    let user = floor.user("alice");
    assert_eq!(user.chips, 1_500);
    assert_eq!(user.chips_in_play, 0);
    assert_eq!(user.bill, bill_before + 1_000);
    let seat = floor.lounge.store.seat("T1", 2).unwrap().unwrap();
    assert_eq!(seat.status, SeatStatus::Empty);

    let session = floor.lounge.store.session(&s1).unwrap().unwrap();
    assert!(!session.is_open());
    assert_eq!(session.chips_out, Some(900));
    assert_eq!(session.profit, Some(500));
    assert_eq!(session.duration_minutes, Some(45));
    assert_eq!(session.play_fee_calculated, Some(1_000));
    assert!(session.play_fee_applied_to_bill);
    assert_eq!(out.fee_billed, 1_000);
    assert!(floor.lounge.open_gaps().unwrap().is_empty());
    assert!(floor.lounge.sweep().unwrap().is_clean());
}

/// Chips only enter through sales and settlements; fees go to the bill.
#[test]
fn chips_are_conserved_across_a_busy_evening() {
    let floor = Floor::new();
    let mut sold = 0;
    let mut settlement_delta = 0;
    for (uid, chips) in [("alice", 1_000), ("bob", 2_500), ("cara", 800)] {
        floor.player_with_chips(uid, chips);
        sold += chips;
    }
    let total = |floor: &Floor| -> i64 {
        ["alice", "bob", "cara"]
            .iter()
            .map(|uid| floor.user(uid).total_chips())
            .sum()
    };

    floor.check_in("alice", "T1", 1, 500).unwrap();
    floor.check_in("bob", "T1", 2, 1_000).unwrap();
    floor.check_in("cara", "T2", 1, 300).unwrap();
    assert_eq!(total(&floor), sold);

    floor.clock.advance_minutes(20);
    floor.dispense("alice", 300).unwrap();
    floor.dispense("cara", 500).unwrap();
    assert_eq!(total(&floor), sold);

    floor.clock.advance_minutes(40);
    for (uid, table, seat, counted) in [("alice", "T1", 1, 1_400), ("bob", "T1", 2, 400)] {
        let in_play = floor.user(uid).chips_in_play;
        floor.settle(uid, table, seat, counted).unwrap();
        settlement_delta += counted - in_play;
    }
    assert_eq!(total(&floor), sold + settlement_delta);

    floor
        .lounge
        .purchase_chips(
            Some(&floor.staff),
            &lounge_core::request::PurchaseChipsRequest {
                user_id: "bob".into(),
                amount: 1_000,
            },
        )
        .unwrap();
    sold += 1_000;
    assert_eq!(total(&floor), sold + settlement_delta);

    // Fees never touch chips.
    let fees: i64 = ["alice", "bob", "cara"]
        .iter()
        .flat_map(|uid| floor.lounge.store.sessions_for_user(uid).unwrap())
        .filter_map(|s| s.play_fee_calculated)
        .sum();
    assert_eq!(fees, 2 * 1_000);
    assert_eq!(floor.user("alice").bill, 1_000 + 1_000);
    assert_eq!(floor.user("bob").bill, 2_500 + 1_000 + 1_000);
}
