//! lounge-runner: headless driver for the lounge ledger.
//!
//! Usage:
//!   lounge-runner --db lounge.db --data-dir ./data --ipc-mode
//!   lounge-runner --simulate --seed 12345 --rounds 500

use anyhow::{bail, Result};
use chrono::Utc;
use lounge_core::{
    auth::Caller,
    callable::{dispatch, CallFailure},
    clock::ManualClock,
    config::LoungeConfig,
    error::LedgerResult,
    lounge::Lounge,
    orders::{ItemKind, OrderItem},
    request::{
        CheckInRequest, InitiateSettlementRequest, OrderRef, PlaceOrderRequest,
        PurchaseChipsRequest, RequestWithdrawalRequest, WithdrawalRef,
    },
    store::LedgerStore,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Call {
        caller: Option<Caller>,
        op: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    RegisterUser {
        user_id: String,
        display_name: String,
    },
    Sweep,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let rounds = parse_arg(&args, "--rounds", 200u64);
    let players = parse_arg(&args, "--players", 12usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let simulate = args.iter().any(|a| a == "--simulate");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    let config = LoungeConfig::load(data_dir)?;

    if simulate {
        println!("Lounge ledger - floor simulation");
        println!("  seed:      {seed}");
        println!("  rounds:    {rounds}");
        println!("  players:   {players}");
        println!("  db:        {db}");
        println!();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = if db == ":memory:" {
            LedgerStore::in_memory()?
        } else {
            LedgerStore::open(db)?
        };
        store.migrate()?;
        let lounge = Lounge::new(store, config, clock.clone());
        lounge.install_tables()?;
        return run_simulation(&lounge, &clock, seed, rounds, players);
    }

    let lounge = if db == ":memory:" {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        let lounge = Lounge::new(store, config, Arc::new(lounge_core::clock::SystemClock));
        lounge.install_tables()?;
        lounge
    } else {
        Lounge::build(db, config)?
    };

    if ipc_mode {
        run_ipc_loop(&lounge)
    } else {
        print_summary(&lounge)
    }
}

/// One JSON command per line on stdin, one JSON reply per line on stdout.
fn run_ipc_loop(lounge: &Lounge) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let Some(reply) = handle_command(lounge, cmd)? else {
            break;
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

/// Run one IPC command. `None` means stop. Ledger failures become
/// `{code, message}` replies; only I/O and encoding errors end the loop.
fn handle_command(lounge: &Lounge, cmd: IpcCommand) -> Result<Option<serde_json::Value>> {
    let reply = match cmd {
        IpcCommand::Quit => return Ok(None),
        IpcCommand::Call { caller, op, payload } => {
            match dispatch(lounge, caller.as_ref(), &op, payload) {
                Ok(ok) => serde_json::to_value(ok)?,
                Err(failure) => serde_json::to_value(failure)?,
            }
        }
        IpcCommand::RegisterUser { user_id, display_name } => {
            render(lounge.register_user(&user_id, &display_name))?
        }
        IpcCommand::Sweep => render(lounge.sweep())?,
    };
    Ok(Some(reply))
}

fn render<T: serde::Serialize>(result: LedgerResult<T>) -> Result<serde_json::Value> {
    Ok(match result {
        Ok(value) => serde_json::to_value(value)?,
        Err(e) => serde_json::to_value(CallFailure::from(e))?,
    })
}

/// Conservation bookkeeping kept outside the ledger.
#[derive(Default)]
struct SimTally {
    purchased: i64,
    settlement_delta: i64,
    check_ins: u64,
    dispenses: u64,
    rejections: u64,
    settlements: u64,
    orders: u64,
    refused: u64,
}

/// Drive random but legal floor traffic and check that chips are conserved.
fn run_simulation(
    lounge: &Lounge,
    clock: &ManualClock,
    seed: u64,
    rounds: u64,
    players: usize,
) -> Result<()> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let staff = Caller::staff("floor-1");
    let mut tally = SimTally::default();

    let user_ids: Vec<String> = (0..players).map(|i| format!("player-{i:03}")).collect();
    for uid in &user_ids {
        lounge.register_user(uid, uid)?;
        let amount = rng.gen_range(5..40) * 100;
        lounge.purchase_chips(
            Some(&staff),
            &PurchaseChipsRequest {
                user_id: uid.clone(),
                amount,
            },
        )?;
        tally.purchased += amount;
    }

    for _ in 0..rounds {
        clock.advance_minutes(rng.gen_range(1..20));
        let uid = &user_ids[rng.gen_range(0..user_ids.len())];
        let player = Caller::player(uid.clone());
        let Some(user) = lounge.store.user(uid)? else {
            bail!("simulated user {uid} vanished");
        };

        if !user.is_checked_in {
            let Some((table_id, seat_number)) = find_empty_seat(lounge, &mut rng)? else {
                continue;
            };
            let amount = (user.chips / 2).max(0);
            match lounge.check_in(
                Some(&staff),
                &CheckInRequest {
                    user_id: uid.clone(),
                    table_id,
                    seat_number,
                    amount_to_play: amount,
                },
            ) {
                Ok(_) => tally.check_ins += 1,
                Err(e) => {
                    log::debug!("sim: check-in refused: {e}");
                    tally.refused += 1;
                }
            }
            continue;
        }

        match rng.gen_range(0..10) {
            0..=3 if user.chips > 0 => {
                let amount = rng.gen_range(1..=user.chips);
                let request_id = lounge.request_withdrawal(
                    Some(&player),
                    &RequestWithdrawalRequest { amount },
                )?;
                let req = WithdrawalRef {
                    withdrawal_request_id: request_id,
                };
                if rng.gen_bool(0.2) {
                    lounge.reject_withdrawal(Some(&staff), &req)?;
                    tally.rejections += 1;
                } else {
                    lounge.approve_withdrawal(Some(&staff), &req)?;
                    lounge.dispense_additional_chips(Some(&staff), &req)?;
                    lounge.confirm_withdrawal_receipt(Some(&player), &req)?;
                    tally.dispenses += 1;
                }
            }
            4 => {
                let order_id = lounge.place_order(
                    Some(&player),
                    &PlaceOrderRequest {
                        items: vec![OrderItem {
                            kind: ItemKind::Drink,
                            name: "Espresso".into(),
                            quantity: rng.gen_range(1..3),
                            unit_price: 250,
                        }],
                    },
                )?;
                let order = OrderRef { order_id };
                lounge.mark_order_delivered(Some(&staff), &order)?;
                lounge.finalize_order(Some(&player), &order)?;
                tally.orders += 1;
            }
            _ => {
                let (Some(table_id), Some(seat_number)) =
                    (user.current_table_id.clone(), user.current_seat_number)
                else {
                    continue;
                };
                // Tables are not zero-sum here; every swing is tracked.
                let swing = rng.gen_range(-(user.chips_in_play)..=user.chips_in_play);
                let counted = (user.chips_in_play + swing).max(0);
                lounge.initiate_settlement(
                    Some(&staff),
                    &InitiateSettlementRequest {
                        user_id: uid.clone(),
                        table_id,
                        seat_number,
                        denominations_count: BTreeMap::from([("1".to_string(), counted)]),
                        total_admin_entered_chips: counted,
                    },
                )?;
                lounge.confirm_settlement(Some(&player))?;
                tally.settlement_delta += counted - user.chips_in_play;
                tally.settlements += 1;
            }
        }
    }

    let held: i64 = lounge
        .store
        .all_users()?
        .iter()
        .map(|u| u.total_chips())
        .sum();
    let expected = tally.purchased + tally.settlement_delta;
    let report = lounge.sweep()?;

    println!("=== SIMULATION SUMMARY ===");
    println!("  check-ins:      {}", tally.check_ins);
    println!("  dispenses:      {}", tally.dispenses);
    println!("  rejections:     {}", tally.rejections);
    println!("  settlements:    {}", tally.settlements);
    println!("  orders:         {}", tally.orders);
    println!("  refused:        {}", tally.refused);
    println!("  chips held:     {held}");
    println!("  chips expected: {expected}");
    println!("  sweep findings: {}", report.findings.len());
    for finding in &report.findings {
        println!("    {}", serde_json::to_string(finding)?);
    }

    if held != expected {
        bail!("chip conservation violated: held {held}, expected {expected}");
    }
    Ok(())
}

fn find_empty_seat(lounge: &Lounge, rng: &mut Pcg64Mcg) -> Result<Option<(String, i64)>> {
    let tables = &lounge.config().tables;
    if tables.is_empty() {
        return Ok(None);
    }
    let table = &tables[rng.gen_range(0..tables.len())];
    for seat_number in 1..=table.seat_count {
        if let Some(seat) = lounge.store.seat(&table.table_id, seat_number)? {
            if !seat.is_occupied() {
                return Ok(Some((table.table_id.clone(), seat_number)));
            }
        }
    }
    Ok(None)
}

fn print_summary(lounge: &Lounge) -> Result<()> {
    let users = lounge.store.all_users()?;
    let seated = users.iter().filter(|u| u.is_checked_in).count();
    let chips: i64 = users.iter().map(|u| u.total_chips()).sum();
    let bills: i64 = users.iter().map(|u| u.bill).sum();
    let report = lounge.sweep()?;

    println!("=== LOUNGE SUMMARY ===");
    println!("  tables:         {}", lounge.config().tables.len());
    println!("  users:          {}", users.len());
    println!("  seated:         {seated}");
    println!("  chips held:     {chips}");
    println!("  open bills:     {bills}");
    println!("  open gaps:      {}", lounge.open_gaps()?.len());
    println!("  sweep findings: {}", report.findings.len());
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
