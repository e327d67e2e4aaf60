//! End-to-end reconciliation cycles against the mock exchange.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{watch, Notify};

use common::{shared, test_universe, Call, MockExchange};
use marketmaker::application::reconcile::{MarketWorker, TriggerBus, WorkerCtx};
use marketmaker::domain::orderbook::PriceLevel;
use marketmaker::domain::position::Side;
use marketmaker::infrastructure::account::AccountState;
use marketmaker::infrastructure::books::BookStore;
use marketmaker::infrastructure::config::EngineTuning;
use marketmaker::infrastructure::exchange::SharedExchange;
use marketmaker::infrastructure::registry::MarketRegistry;
use marketmaker::infrastructure::risk_registry::{RiskOffReason, RiskOffRegistry};
use marketmaker::infrastructure::volatility::{VolatilitySource, VolatilityTable};

struct Harness {
    books: Arc<BookStore>,
    account: Arc<AccountState>,
    risk: Arc<RiskOffRegistry>,
    exchange: Arc<MockExchange>,
    volatility: Arc<VolatilityTable>,
    pull_epoch: Arc<AtomicU64>,
    worker: MarketWorker,
    _risk_dir: tempfile::TempDir,
    _shutdown_tx: watch::Sender<bool>,
}

fn harness() -> Harness {
    let books = shared(BookStore::new());
    let account = shared(AccountState::new());
    let risk_dir = tempfile::tempdir().unwrap();
    let risk = shared(RiskOffRegistry::open(risk_dir.path()).unwrap());
    let registry = shared(MarketRegistry::new());
    registry.refresh(test_universe());
    let exchange = shared(MockExchange::new());
    let volatility = shared(VolatilityTable::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let bus = TriggerBus::new();
    let pull_epoch = Arc::new(AtomicU64::new(0));

    let ctx = WorkerCtx {
        books: Arc::clone(&books),
        account: Arc::clone(&account),
        risk: Arc::clone(&risk),
        registry,
        exchange: Arc::clone(&exchange) as SharedExchange,
        volatility: Arc::clone(&volatility) as Arc<dyn VolatilitySource>,
        tuning: EngineTuning::default(),
        pull_now: Arc::new(Notify::new()),
        pull_epoch: Arc::clone(&pull_epoch),
    };

    let worker = MarketWorker::new(
        "cond-1".to_string(),
        ctx,
        bus.cell("cond-1"),
        shutdown_rx,
    );

    Harness {
        books,
        account,
        risk,
        exchange,
        volatility,
        pull_epoch,
        worker,
        _risk_dir: risk_dir,
        _shutdown_tx: shutdown_tx,
    }
}

fn level(price: &str, size: &str) -> PriceLevel {
    PriceLevel {
        price: price.to_string(),
        size: size.to_string(),
    }
}

fn seed_book(h: &Harness, token: &str, bid: &str, ask: &str) {
    h.books
        .apply_snapshot(token, &[level(bid, "100")], &[level(ask, "100")]);
}

#[tokio::test]
async fn cold_start_places_single_bid() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");

    let acted = h.worker.reconcile_once().await.unwrap();
    assert!(acted);

    let calls = h.exchange.calls();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Call::Create {
            token_id,
            side,
            price,
            size,
        } => {
            assert_eq!(token_id, "tok-a");
            assert_eq!(*side, Side::Buy);
            assert!((price - 0.50).abs() < 1e-9);
            assert!((size - 40.0).abs() < 1e-9); // 20 notional at 0.50
        }
        other => panic!("unexpected call {:?}", other),
    }

    // optimistic tracking of the acked order
    assert!(h.account.orders("tok-a").buy.is_some());
}

#[tokio::test]
async fn unchanged_inputs_make_second_cycle_silent() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");

    h.worker.reconcile_once().await.unwrap();
    h.exchange.clear_calls();

    let acted = h.worker.reconcile_once().await.unwrap();
    assert!(!acted);
    assert!(h.exchange.calls().is_empty());
}

#[tokio::test]
async fn position_adds_take_profit_sell() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.54");
    h.account.apply_fill("tok-a", Side::Buy, 40.0, 0.50);

    h.worker.reconcile_once().await.unwrap();

    let creates = h.exchange.creates();
    assert_eq!(creates.len(), 2);
    let buy = creates
        .iter()
        .find(|c| matches!(c, Call::Create { side: Side::Buy, .. }))
        .unwrap();
    let sell = creates
        .iter()
        .find(|c| matches!(c, Call::Create { side: Side::Sell, .. }))
        .unwrap();

    if let Call::Create { price, size, .. } = buy {
        assert!((price - 0.50).abs() < 1e-9);
        assert!((size - 40.0).abs() < 1e-9); // headroom 40 notional
    }
    if let Call::Create { price, size, .. } = sell {
        assert!((price - 0.55).abs() < 1e-9); // 0.50 * 1.10 rounded up
        assert!((size - 40.0).abs() < 1e-9); // full position
    }
}

#[tokio::test]
async fn small_bid_drift_keeps_resting_order() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.worker.reconcile_once().await.unwrap();
    h.exchange.clear_calls();

    // best bid ticks up one cent: drift 0.01 <= 0.015 tolerance
    h.books.apply_delta("tok-a", "BUY", "0.51", "50");
    h.worker.reconcile_once().await.unwrap();
    assert!(h.exchange.calls().is_empty());

    // two cents: drift 0.02 breaks the tolerance, cancel and re-place
    h.books.apply_delta("tok-a", "BUY", "0.52", "50");
    h.worker.reconcile_once().await.unwrap();

    let calls = h.exchange.calls();
    assert!(calls.contains(&Call::CancelToken("tok-a".to_string())));
    assert!(calls.iter().any(|c| matches!(
        c,
        Call::Create { side: Side::Buy, price, .. } if (price - 0.52).abs() < 1e-9
    )));
}

#[tokio::test]
async fn volatility_trip_liquidates_and_pauses() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.account.apply_fill("tok-a", Side::Buy, 40.0, 0.50);
    h.volatility.set("cond-1", 30.0); // threshold is 20

    h.worker.reconcile_once().await.unwrap();

    // single liquidation sell at best bid, full position
    let creates = h.exchange.creates();
    assert_eq!(creates.len(), 1);
    if let Call::Create { side, price, size, .. } = &creates[0] {
        assert_eq!(*side, Side::Sell);
        assert!((price - 0.50).abs() < 1e-9);
        assert!((size - 40.0).abs() < 1e-9);
    }

    let record = h.risk.get("cond-1").unwrap();
    assert_eq!(record.reason, RiskOffReason::Volatility);
    assert!(record.sleep_until > Utc::now());

    // paused: no further quoting
    h.exchange.clear_calls();
    let acted = h.worker.reconcile_once().await.unwrap();
    assert!(!acted);
    assert!(h.exchange.calls().is_empty());
}

#[tokio::test]
async fn expired_pause_clears_and_resumes() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.risk
        .trip(
            "cond-1",
            RiskOffReason::StopLoss,
            Utc::now() - ChronoDuration::minutes(1),
        )
        .unwrap();

    h.worker.reconcile_once().await.unwrap();

    assert!(h.risk.get("cond-1").is_none());
    assert_eq!(h.exchange.creates().len(), 1);
}

#[tokio::test]
async fn opposing_position_cancels_resting_buy() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.worker.reconcile_once().await.unwrap();
    h.exchange.clear_calls();

    // complementary leg fills up: reverse position exceeds min_size
    h.account.apply_fill("tok-b", Side::Buy, 30.0, 0.45);
    h.worker.reconcile_once().await.unwrap();

    let calls = h.exchange.calls();
    assert!(calls.contains(&Call::CancelToken("tok-a".to_string())));
    assert!(
        !calls
            .iter()
            .any(|c| matches!(c, Call::Create { token_id, side: Side::Buy, .. } if token_id == "tok-a")),
        "buy must stay suppressed while the reverse leg holds inventory"
    );
}

#[tokio::test]
async fn full_headroom_suppresses_buy_but_keeps_sell() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.account.apply_fill("tok-a", Side::Buy, 120.0, 0.50); // notional 60 == max_size

    h.worker.reconcile_once().await.unwrap();

    let creates = h.exchange.creates();
    assert_eq!(creates.len(), 1);
    assert!(matches!(&creates[0], Call::Create { side: Side::Sell, .. }));
}

#[tokio::test]
async fn complementary_inventory_triggers_merge() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    seed_book(&h, "tok-b", "0.45", "0.47");
    h.account.apply_fill("tok-a", Side::Buy, 25.0, 0.50);
    h.account.apply_fill("tok-b", Side::Buy, 25.0, 0.45);

    h.worker.reconcile_once().await.unwrap();

    let merge = h
        .exchange
        .calls()
        .into_iter()
        .find(|c| matches!(c, Call::Merge { .. }));
    match merge {
        Some(Call::Merge {
            condition_id,
            amount_microshares,
        }) => {
            assert_eq!(condition_id, "cond-1");
            assert_eq!(amount_microshares, 25_000_000);
        }
        other => panic!("expected merge, got {:?}", other),
    }

    // cooldown: the same inventory does not merge twice back to back
    h.exchange.clear_calls();
    h.worker.reconcile_once().await.unwrap();
    assert!(!h
        .exchange
        .calls()
        .iter()
        .any(|c| matches!(c, Call::Merge { .. })));
}

#[tokio::test(start_paused = true)]
async fn place_timeout_parks_side_until_pull() {
    let mut h = harness();
    seed_book(&h, "tok-a", "0.50", "0.52");
    h.exchange.hang_creates.store(true, Ordering::Release);

    // paused clock auto-advances: the 10 s deadline fires immediately
    h.worker.reconcile_once().await.unwrap();
    assert!(h.account.orders("tok-a").buy.is_none()); // nothing tracked

    // side stays parked even though the exchange works again
    h.exchange.hang_creates.store(false, Ordering::Release);
    h.exchange.clear_calls();
    h.worker.reconcile_once().await.unwrap();
    assert!(h.exchange.calls().is_empty());

    // an authoritative pull lands; the side may act again
    h.pull_epoch.fetch_add(1, Ordering::Release);
    h.worker.reconcile_once().await.unwrap();
    assert_eq!(h.exchange.creates().len(), 1);
}
