//! Independent connections racing over the same file database.

mod common;

use lounge_core::{
    auth::Caller,
    clock::ManualClock,
    config::LoungeConfig,
    error::{ErrorCode, LedgerResult},
    lounge::Lounge,
    request::{CheckInRequest, PurchaseChipsRequest},
    store::LedgerStore,
};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

struct TempDb(PathBuf);

impl TempDb {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("lounge-{name}-{}.db", std::process::id()));
        let db = Self(path);
        db.remove();
        db
    }

    fn path(&self) -> &str {
        self.0.to_str().unwrap()
    }

    fn remove(&self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path()));
        }
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        self.remove();
    }
}

fn open_lounge(path: &str, clock: &Arc<ManualClock>) -> Lounge {
    let store = LedgerStore::open(path).unwrap();
    store.migrate().unwrap();
    let lounge = Lounge::new(store, LoungeConfig::default_test(), clock.clone());
    lounge.install_tables().unwrap();
    lounge
}

/// Request handlers with their own connection to the setup lounge's database.
fn handlers(setup: &Lounge, clock: &Arc<ManualClock>, count: usize) -> Vec<Lounge> {
    (0..count)
        .map(|_| {
            let store = setup.store.reopen().unwrap();
            Lounge::new(store, LoungeConfig::default_test(), clock.clone())
        })
        .collect()
}

fn race<T, F>(lounges: Vec<Lounge>, op: F) -> Vec<LedgerResult<T>>
where
    T: Send + 'static,
    F: Fn(&Lounge, usize) -> LedgerResult<T> + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(lounges.len()));
    let op = Arc::new(op);
    let handles: Vec<_> = lounges
        .into_iter()
        .enumerate()
        .map(|(i, lounge)| {
            let barrier = barrier.clone();
            let op = op.clone();
            thread::spawn(move || {
                barrier.wait();
                op(&lounge, i)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn two_players_racing_for_one_seat() {
    common::init_logging();
    let db = TempDb::new("seat-race");
    let clock = Arc::new(ManualClock::new(common::opening_time()));
    let staff = Caller::staff("staff-1");

    let setup = open_lounge(db.path(), &clock);
    for uid in ["alice", "bob"] {
        setup.register_user(uid, uid).unwrap();
        setup
            .purchase_chips(
                Some(&staff),
                &PurchaseChipsRequest {
                    user_id: uid.into(),
                    amount: 500,
                },
            )
            .unwrap();
    }

    let lounges = handlers(&setup, &clock, 2);
    let results = race(lounges, move |lounge, i| {
        let uid = ["alice", "bob"][i];
        lounge.check_in(
            Some(&Caller::staff("staff-1")),
            &CheckInRequest {
                user_id: uid.into(),
                table_id: "T1".into(),
                seat_number: 5,
                amount_to_play: 300,
            },
        )
    });

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one check-in should win: {results:?}");
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert_eq!(loser.code(), ErrorCode::FailedPrecondition);

    let seat = setup.store.seat("T1", 5).unwrap().unwrap();
    let holder = seat.user_id.clone().unwrap();
    let other = if holder == "alice" { "bob" } else { "alice" };

    let winner = setup.store.user(&holder).unwrap().unwrap();
    assert_eq!((winner.chips, winner.chips_in_play), (200, 300));
    let loser = setup.store.user(other).unwrap().unwrap();
    assert_eq!((loser.chips, loser.chips_in_play), (500, 0));
    assert!(!loser.is_checked_in);
}

#[test]
fn one_withdrawal_dispensed_from_two_connections() {
    common::init_logging();
    let db = TempDb::new("dispense-race");
    let clock = Arc::new(ManualClock::new(common::opening_time()));
    let staff = Caller::staff("staff-1");

    let setup = open_lounge(db.path(), &clock);
    setup.register_user("alice", "alice").unwrap();
    setup
        .purchase_chips(
            Some(&staff),
            &PurchaseChipsRequest {
                user_id: "alice".into(),
                amount: 1_000,
            },
        )
        .unwrap();
    setup
        .check_in(
            Some(&staff),
            &CheckInRequest {
                user_id: "alice".into(),
                table_id: "T1".into(),
                seat_number: 1,
                amount_to_play: 100,
            },
        )
        .unwrap();
    let request_id = setup
        .request_withdrawal(
            Some(&Caller::player("alice")),
            &lounge_core::request::RequestWithdrawalRequest { amount: 400 },
        )
        .unwrap();
    let req = lounge_core::request::WithdrawalRef {
        withdrawal_request_id: request_id,
    };
    setup.approve_withdrawal(Some(&staff), &req).unwrap();

    let lounges = handlers(&setup, &clock, 2);
    let results = race(lounges, move |lounge, _| {
        lounge.dispense_additional_chips(Some(&Caller::staff("staff-2")), &req)
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{results:?}");
    let user = setup.store.user("alice").unwrap().unwrap();
    assert_eq!((user.chips, user.chips_in_play), (500, 500));
    let session = setup
        .store
        .session(user.active_game_session_id.as_deref().unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(session.total_chips_in, 500);
}
