//! Integration tests for the transactional facade: rollback, event
//! publication, and shared use across threads.

use std::sync::Arc;
use std::thread;

use rwa_contracts::{ContractError, LeveragePosition, LiquidationResolution, Market};
use rwa_protocol::asset::{FungibleAsset, TokenLedger};
use rwa_protocol::clock::ManualClock;
use rwa_protocol::config::{ProtocolConfig, DEFAULT_DEPOSIT_CAP, DEFAULT_POOL_ID, SECONDS_PER_DAY};
use rwa_protocol::error::ErrorKind;
use rwa_protocol::events::Event;
use rwa_protocol::types::{Address, PoolStatus};

const THIRTY_DAYS: u64 = 30 * SECONDS_PER_DAY;

fn admin() -> Address {
    Address::new("admin")
}

/// Routes engine logs through the test harness; `RUST_LOG` still wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rwa_contracts=debug")),
        )
        .try_init();
}

fn setup(config: ProtocolConfig) -> Market {
    init_tracing();
    let mut market = Market::new(
        config,
        TokenLedger::new("USDC", 6),
        Arc::new(ManualClock::new(1_700_000_000)),
    )
    .unwrap();
    market
        .initialize(
            &admin(),
            &admin(),
            &Address::new("usdc"),
            &Address::new("treasury"),
            &admin(),
            DEFAULT_DEPOSIT_CAP,
        )
        .unwrap();
    market.activate_pool(&admin()).unwrap();
    market
        .update_pool_status(&admin(), DEFAULT_POOL_ID, PoolStatus::Active)
        .unwrap();
    let engine = market.leverage().address().clone();
    market.add_grant_manager(&admin(), &engine).unwrap();
    market.asset_mut().mint(&admin(), 1_000_000).unwrap();
    market.drain_events();
    market
}

fn deposit(market: &mut Market, name: &str, amount: u64) -> Address {
    let who = Address::new(name);
    let vault = market.vault().address().clone();
    market.transfer_underlying(&admin(), &who, amount).unwrap();
    market.approve_underlying(&who, &vault, amount).unwrap();
    market.deposit(&who, amount, &who).unwrap();
    who
}

fn stake_and_borrow(market: &mut Market, who: &Address, shares: u64, amount: u64) {
    let engine = market.leverage().address().clone();
    market.approve_shares(who, &engine, shares).unwrap();
    market.stake(who, shares, THIRTY_DAYS).unwrap();
    market.borrow(who, amount, THIRTY_DAYS).unwrap();
}

// ---------------------------------------------------------------------------
// Atomicity
// ---------------------------------------------------------------------------

#[test]
fn failed_batch_liquidation_rolls_back_earlier_entries() {
    let mut market = setup(ProtocolConfig::default());
    let alice = deposit(&mut market, "alice", 1_000);
    let bob = deposit(&mut market, "bob", 1_000);
    stake_and_borrow(&mut market, &alice, 500, 100);
    stake_and_borrow(&mut market, &bob, 500, 100);
    let alice_before = market.leverages(&alice);
    let bob_before = market.leverages(&bob);
    let events_before = market.events().len();

    // Without the grant-manager role the engine cannot burn seized shares,
    // so the second entry fails after the first has been applied.
    let engine = market.leverage().address().clone();
    market.remove_grant_manager(&admin(), &engine).unwrap();
    let events_before = events_before + 1;

    let forgive_alice = LiquidationResolution {
        borrower: alice.clone(),
        position: LeveragePosition {
            total_staked: 500,
            ..LeveragePosition::default()
        },
    };
    let err = market
        .liquidate(&admin(), &[forgive_alice, LiquidationResolution::seize_all(bob.clone())])
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert_eq!(market.leverages(&alice), alice_before);
    assert_eq!(market.leverages(&bob), bob_before);
    assert_eq!(market.vault().total_supply(), 2_000);
    assert_eq!(market.events().len(), events_before);
}

#[test]
fn failed_deposit_leaves_balances_untouched() {
    let mut market = setup(ProtocolConfig::default());
    let by = Address::new("lender");
    market.transfer_underlying(&admin(), &by, 100).unwrap();
    let vault = market.vault().address().clone();
    market.approve_underlying(&by, &vault, 50).unwrap();

    let err = market.deposit(&by, 100, &by).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(market.asset().balance_of(&by), 100);
    assert_eq!(market.asset().allowance(&by, &vault), 50);
    assert_eq!(market.vault().balance_of(&by), 0);
    assert_eq!(market.vault().state().reserve, 0);
}

#[test]
fn every_operation_reads_the_clock_once() {
    let clock = ManualClock::new(42);
    let mut market = Market::new(
        ProtocolConfig::default(),
        TokenLedger::new("USDC", 6),
        Arc::new(clock.clone()),
    )
    .unwrap();
    market
        .initialize(&admin(), &admin(), &Address::new("usdc"), &Address::new("treasury"), &admin(), 1_000)
        .unwrap();
    clock.advance(8);
    market.activate_pool(&admin()).unwrap();

    let stamps: Vec<u64> = market.events().iter().map(|r| r.timestamp).collect();
    assert_eq!(stamps, vec![42, 50]);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn borrow_and_pay_publish_events_in_order() {
    let mut config = ProtocolConfig::default();
    config.vault.deployment_ratio_bps = 5_000;
    let mut market = setup(config);
    let by = deposit(&mut market, "lender", 1_000);
    let names: Vec<&str> = market.drain_events().iter().map(|r| r.event.name()).collect();
    assert_eq!(names, vec!["deposit", "deployed"]);

    stake_and_borrow(&mut market, &by, 1_000, 100);
    let engine = market.leverage().address().clone();
    market.approve_underlying(&by, &engine, 100).unwrap();
    market.pay(&by).unwrap();

    let names: Vec<&str> = market.drain_events().iter().map(|r| r.event.name()).collect();
    assert_eq!(
        names,
        vec![
            "shares_approved",
            "shares_transferred",
            "staked",
            "granted",
            "borrowed",
            "repayment_received",
            "repaid",
        ]
    );
    assert!(market.events().is_empty());
}

#[test]
fn events_serialize_with_a_type_tag() {
    let mut market = setup(ProtocolConfig::default());
    deposit(&mut market, "lender", 250);

    let record = market
        .events()
        .iter()
        .find(|r| matches!(r.event, Event::Deposit { .. }))
        .cloned()
        .unwrap();
    let json = serde_json::to_value(&record).unwrap();

    assert_eq!(json["event"]["type"], "deposit");
    assert_eq!(json["event"]["sender"], "lender");
    assert_eq!(json["event"]["assets"], 250);
    assert_eq!(json["event"]["shares"], 250);
    assert_eq!(json["timestamp"], 1_700_000_000);

    let back: rwa_protocol::events::EventRecord = serde_json::from_value(json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn engine_state_survives_a_json_snapshot() {
    let mut market = setup(ProtocolConfig::default());
    let by = deposit(&mut market, "lender", 2_000);
    stake_and_borrow(&mut market, &by, 1_000, 300);

    let vault_json = serde_json::to_string(market.vault()).unwrap();
    let leverage_json = serde_json::to_string(market.leverage()).unwrap();
    let vault: rwa_contracts::Vault = serde_json::from_str(&vault_json).unwrap();
    let leverage: rwa_contracts::LeverageEngine = serde_json::from_str(&leverage_json).unwrap();

    assert_eq!(&vault, market.vault());
    assert_eq!(&leverage, market.leverage());
    assert_eq!(leverage.leverages(&by).total_borrowed, 300);
}

// ---------------------------------------------------------------------------
// Sharing
// ---------------------------------------------------------------------------

#[test]
fn shared_market_serializes_concurrent_deposits() {
    let mut market = setup(ProtocolConfig::default());
    let vault = market.vault().address().clone();
    let lenders: Vec<Address> = (0..8).map(|i| Address::new(format!("lender-{i}"))).collect();
    for who in &lenders {
        market.transfer_underlying(&admin(), who, 1_000).unwrap();
        market.approve_underlying(who, &vault, 1_000).unwrap();
    }
    let shared = market.into_shared();

    let handles: Vec<_> = lenders
        .iter()
        .cloned()
        .map(|who| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for _ in 0..10 {
                    shared.lock().deposit(&who, 100, &who).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let market = shared.lock();
    assert_eq!(market.vault().total_supply(), 8_000);
    assert_eq!(market.vault().state().reserve, 8_000);
    for who in &lenders {
        assert_eq!(market.vault().balance_of(who), 1_000);
        assert_eq!(market.asset().balance_of(who), 0);
    }
}

#[test]
fn config_loaded_from_json_drives_the_market() {
    let json = r#"{
        "vault": { "deployment_ratio_bps": 2500 },
        "leverage": { "max_ltv_bps": 5000, "liquidation_policy": "RequireShortfall" }
    }"#;
    let config = ProtocolConfig::from_json_str(json).unwrap();
    let mut market = setup(config);

    let by = deposit(&mut market, "lender", 1_000);
    assert_eq!(market.vault().state().reserve, 750);
    assert_eq!(market.vault().state().assets_under_management, 250);

    let engine = market.leverage().address().clone();
    market.approve_shares(&by, &engine, 1_000).unwrap();
    market.stake(&by, 1_000, 0).unwrap();
    let err = market.borrow(&by, 501, THIRTY_DAYS).unwrap_err();
    assert!(matches!(err, ContractError::Leverage(_)));
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
}

#[test]
fn with_defaults_uses_the_system_clock() {
    let market = Market::with_defaults(ProtocolConfig::default()).unwrap();
    assert!(market.now() > 1_577_836_800);
    assert!(!market.vault().is_initialized());
}
