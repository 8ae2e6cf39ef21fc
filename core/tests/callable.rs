//! The JSON callable surface: decoding, error codes and messages.

mod common;

use common::Floor;
use lounge_core::{auth::Caller, callable::dispatch, error::ErrorCode};
use serde_json::json;

#[test]
fn unauthenticated_calls_fail_before_decoding() {
    let floor = Floor::new();
    let failure = dispatch(&floor.lounge, None, "checkIn", json!("not even an object")).unwrap_err();
    assert_eq!(failure.code, ErrorCode::Unauthenticated);
    let failure = dispatch(&floor.lounge, None, "noSuchOperation", json!({})).unwrap_err();
    assert_eq!(failure.code, ErrorCode::Unauthenticated);
}

#[test]
fn unknown_operation_is_invalid_argument() {
    let floor = Floor::new();
    let failure = dispatch(&floor.lounge, Some(&floor.staff), "cashOut", json!({})).unwrap_err();
    assert_eq!(failure.code, ErrorCode::InvalidArgument);
    assert!(failure.message.contains("cashOut"));
}

#[test]
fn malformed_payloads_are_invalid_argument() {
    let floor = Floor::new();
    floor.player_with_chips("alice", 1_000);

    let missing_seat = json!({ "userId": "alice", "tableId": "T1", "amountToPlay": 100 });
    let failure = dispatch(&floor.lounge, Some(&floor.staff), "checkIn", missing_seat).unwrap_err();
    assert_eq!(failure.code, ErrorCode::InvalidArgument);

    let fractional = json!({ "userId": "alice", "tableId": "T1", "seatNumber": 1.5, "amountToPlay": 100 });
    let failure = dispatch(&floor.lounge, Some(&floor.staff), "checkIn", fractional).unwrap_err();
    assert_eq!(failure.code, ErrorCode::InvalidArgument);

    let zero_seat = json!({ "userId": "alice", "tableId": "T1", "seatNumber": 0, "amountToPlay": 100 });
    let failure = dispatch(&floor.lounge, Some(&floor.staff), "checkIn", zero_seat).unwrap_err();
    assert_eq!(failure.code, ErrorCode::InvalidArgument);
}

#[test]
fn failures_serialize_with_kebab_case_codes() {
    let floor = Floor::new();
    let alice = floor.player_with_chips("alice", 0);
    let failure = dispatch(&floor.lounge, Some(&alice), "confirmSettlement", json!(null)).unwrap_err();
    let wire = serde_json::to_value(&failure).unwrap();
    assert_eq!(wire["code"], "failed-precondition");
    assert!(wire["message"].as_str().unwrap().contains("pending chip settlement"));

    let failure = dispatch(
        &floor.lounge,
        Some(&alice),
        "checkIn",
        json!({ "userId": "alice", "tableId": "T1", "seatNumber": 1, "amountToPlay": 0 }),
    )
    .unwrap_err();
    assert_eq!(serde_json::to_value(&failure).unwrap()["code"], "permission-denied");
}

#[test]
fn evening_over_the_wire() {
    let floor = Floor::new();
    let alice = Caller::player("alice");
    floor.lounge.register_user("alice", "Alice").unwrap();

    let ok = dispatch(
        &floor.lounge,
        Some(&floor.staff),
        "purchaseChips",
        json!({ "userId": "alice", "amount": 1000 }),
    )
    .unwrap();
    assert_eq!(ok.status, "success");

    let ok = dispatch(
        &floor.lounge,
        Some(&floor.staff),
        "checkIn",
        json!({ "userId": "alice", "tableId": "T1", "seatNumber": 2, "amountToPlay": 400 }),
    )
    .unwrap();
    assert!(ok.message.contains("400"), "{}", ok.message);
    assert!(ok.message.contains("600"), "{}", ok.message);

    let ok = dispatch(
        &floor.lounge,
        Some(&floor.staff),
        "initiateSettlement",
        json!({
            "userId": "alice",
            "tableId": "T1",
            "seatNumber": 2,
            "denominationsCount": { "100": 9 },
            "totalAdminEnteredChips": 900
        }),
    )
    .unwrap();
    assert!(ok.message.contains("900"));

    floor.clock.advance_minutes(45);
    let ok = dispatch(&floor.lounge, Some(&alice), "confirmSettlement", json!({})).unwrap();
    assert_eq!(ok.status, "success");
    assert!(ok.message.contains("900 chips returned"), "{}", ok.message);
    assert!(ok.message.contains("balance now 1500"), "{}", ok.message);
    assert!(ok.message.contains("play fee 1000"), "{}", ok.message);

    let user = floor.user("alice");
    assert_eq!(user.chips, 1_500);
    assert_eq!(user.bill, 2_000);
}

#[test]
fn orders_and_withdrawals_over_the_wire() {
    let floor = Floor::new();
    let alice = floor.player_with_chips("alice", 1_000);
    floor.check_in("alice", "T1", 1, 200).unwrap();

    let ok = dispatch(&floor.lounge, Some(&alice), "requestWithdrawal", json!({ "amount": 300 })).unwrap();
    let request_id = floor
        .lounge
        .store
        .events_for_user("alice")
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.decode().unwrap() {
            lounge_core::event::LedgerEvent::WithdrawalRequested { request_id, .. } => Some(request_id),
            _ => None,
        })
        .last()
        .unwrap();
    assert!(ok.message.contains(&request_id));

    let by_id = json!({ "withdrawalRequestId": request_id });
    dispatch(&floor.lounge, Some(&floor.staff), "approveWithdrawal", by_id.clone()).unwrap();
    let ok = dispatch(&floor.lounge, Some(&floor.staff), "dispenseAdditionalChips", by_id.clone()).unwrap();
    assert!(ok.message.contains("500 now in play"), "{}", ok.message);
    dispatch(&floor.lounge, Some(&alice), "confirmWithdrawalReceipt", by_id).unwrap();

    dispatch(
        &floor.lounge,
        Some(&alice),
        "placeOrder",
        json!({ "items": [{ "kind": "drink", "name": "Cola", "quantity": 2, "unitPrice": 300 }] }),
    )
    .unwrap();
    let order_id = floor
        .lounge
        .store
        .events_for_user("alice")
        .unwrap()
        .into_iter()
        .filter_map(|e| match e.decode().unwrap() {
            lounge_core::event::LedgerEvent::OrderPlaced { order_id, .. } => Some(order_id),
            _ => None,
        })
        .last()
        .unwrap();
    let by_order = json!({ "orderId": order_id });
    dispatch(&floor.lounge, Some(&floor.staff), "markOrderDelivered", by_order.clone()).unwrap();
    let ok = dispatch(&floor.lounge, Some(&alice), "finalizeOrder", by_order).unwrap();
    assert!(ok.message.contains("600 added to bill"), "{}", ok.message);
    assert_eq!(floor.user("alice").bill, 1_600);
}
