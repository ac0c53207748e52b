//! End-to-end scenarios for the per-symbol worker: warm-up, two-way
//! entry, trailing exits, signal closes, cooldown, and atomic entry
//! reversion, all driven by synthetic tick streams through the paper
//! gateway.

use async_trait::async_trait;
use configuration::{CoinParams, CoinParamsEntry, EngineSettings, Simulation, StrategyVariant};
use core_types::{ExitReason, Fill, OrderIntent, Side, Tick};
use engine::{SymbolState, SymbolWorker};
use executor::{ExecutionGateway, OrderError, PaperGateway};
use ledger::{Ledger, LedgerPersistence};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// 100 ms per tick; the oscillation below has enough dispersion to clear
/// the aggressive variant's volatility gates while keeping the band
/// position near centre on every 10th tick.
const TICK_INTERVAL_MS: i64 = 100;
const PATTERN: [Decimal; 4] = [dec!(100.0), dec!(100.2), dec!(100.7), dec!(100.3)];

fn engine_settings() -> EngineSettings {
    EngineSettings {
        initial_equity: dec!(10000),
        buffer_capacity: 10_000,
        lookback_secs: 60,
        atr_subwindow_ticks: 50,
        signal_every_ticks: 10,
        snapshot_every_ticks: 5,
        signal_min_ticks: 100,
        channel_capacity: 1024,
    }
}

fn simulation() -> Simulation {
    Simulation {
        taker_fee_pct: dec!(0.0005),
        maker_fee_pct: dec!(0.0002),
        slippage_pct: dec!(0.0001),
        market_order_deadline_secs: 5,
        limit_order_deadline_secs: 30,
    }
}

fn coin_params() -> CoinParams {
    CoinParamsEntry {
        symbol: "ETHUSDT".to_string(),
        excluded: false,
        strategy_variant: StrategyVariant::Aggressive,
        hybrid_vol_threshold_pct: None,
        atr_vol_threshold_pct: None,
        bb_band_min: None,
        bb_band_max: None,
        cooldown_seconds: None,
        position_size_fraction: dec!(0.1),
        leverage: 10,
        hard_stop_atr_multiplier: 2.0,
        min_loss_floor_pct: 0.01,
        bb_bandwidth_threshold: 0.05,
        entry_strength_min: 0.5,
    }
    .resolve()
    .unwrap()
}

fn tick_at(index: i64, price: Decimal) -> Tick {
    Tick {
        symbol: "ETHUSDT".to_string(),
        timestamp: index * TICK_INTERVAL_MS,
        price,
        volume: dec!(1),
        is_buyer_maker: None,
    }
}

fn oscillation_tick(index: i64) -> Tick {
    tick_at(index, PATTERN[(index as usize) % PATTERN.len()])
}

struct Harness {
    worker: SymbolWorker,
    gateway: Arc<PaperGateway>,
    ledger: Arc<Mutex<Ledger>>,
    next_index: i64,
}

impl Harness {
    fn new() -> Self {
        let gateway = Arc::new(PaperGateway::new(simulation()));
        let ledger = Arc::new(Mutex::new(Ledger::new(dec!(10000), simulation())));
        let (event_tx, _) = broadcast::channel(256);
        let worker = SymbolWorker::new(
            coin_params(),
            engine_settings(),
            &simulation(),
            Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
            Arc::clone(&ledger),
            event_tx,
        )
        .unwrap();
        Self {
            worker,
            gateway,
            ledger,
            next_index: 0,
        }
    }

    async fn feed(&mut self, tick: Tick) {
        self.gateway.record_tick(&tick);
        self.worker.process_tick(tick).await.unwrap();
    }

    /// Feeds the oscillation until the straddle opens. Panics if it never
    /// does (the stream satisfies the entry conditions by construction).
    async fn run_until_both_open(&mut self) -> i64 {
        for _ in 0..3000 {
            let tick = oscillation_tick(self.next_index);
            self.next_index += 1;
            self.feed(tick).await;
            if self.worker.state() == SymbolState::BothOpen {
                return self.next_index - 1;
            }
        }
        panic!("entry never fired over the synthetic oscillation");
    }

    async fn feed_oscillation(&mut self, count: i64) {
        for _ in 0..count {
            let tick = oscillation_tick(self.next_index);
            self.next_index += 1;
            self.feed(tick).await;
        }
    }

    async fn feed_price(&mut self, price: Decimal) {
        let tick = tick_at(self.next_index, price);
        self.next_index += 1;
        self.feed(tick).await;
    }
}

#[tokio::test]
async fn warmup_then_two_way_entry() {
    let mut harness = Harness::new();

    // Nothing can happen before the lookback window fills: 60 s at 10
    // ticks/sec is 600 ticks.
    harness.feed_oscillation(300).await;
    assert_eq!(harness.worker.state(), SymbolState::Idle);
    assert_eq!(harness.ledger.lock().await.open_position_count(), 0);

    let entry_index = harness.run_until_both_open().await;
    assert!(entry_index >= 600, "entered before the window filled");

    let ledger = harness.ledger.lock().await;
    assert_eq!(ledger.open_position_count(), 2);
    let open = ledger.open_positions();
    assert_eq!(open[0].side, Side::Long);
    assert_eq!(open[1].side, Side::Short);
    // Both legs fill the same signal at the same mark.
    assert_eq!(open[0].entry_price, open[1].entry_price);
    assert_eq!(open[0].quantity, open[1].quantity);
    assert_eq!(open[0].opened_by_signal_id, open[1].opened_by_signal_id);
    // Entry consumed no equity; only closes move the account.
    assert_eq!(ledger.account_equity(), dec!(10000));
    // Long stops below entry, short above.
    assert!(open[0].current_stop_price < open[0].entry_price);
    assert!(open[1].current_stop_price > open[1].entry_price);
}

#[tokio::test]
async fn trailing_stops_close_each_leg_at_the_stop_price() {
    let mut harness = Harness::new();
    harness.run_until_both_open().await;

    // A sharp 1.7% jump: the short's tightened trail sits ~1.05% above
    // entry and gives way first.
    harness.feed_price(dec!(102)).await;
    assert_eq!(harness.worker.state(), SymbolState::LongOnly);

    // Pull back through the long's ratcheted trail (which locked in
    // profit near 102 * (1 - ~1%)).
    harness.feed_price(dec!(100.5)).await;
    assert_eq!(harness.worker.state(), SymbolState::Idle);

    let ledger = harness.ledger.lock().await;
    let trades = ledger.closed_trades();
    assert_eq!(trades.len(), 2);

    let short = &trades[0];
    assert_eq!(short.side, Side::Short);
    assert_eq!(short.exit_reason, ExitReason::TrailingStop);
    // Stop exits settle at the stop level, not the tick that pierced it.
    assert!(short.exit_price < dec!(102));
    assert!(short.net_pnl < Decimal::ZERO);

    let long = &trades[1];
    assert_eq!(long.side, Side::Long);
    assert_eq!(long.exit_reason, ExitReason::TrailingStop);
    assert!(long.exit_price > dec!(100.5));
    assert!(long.net_pnl > Decimal::ZERO);

    assert_eq!(
        ledger.account_equity(),
        dec!(10000) + long.net_pnl + short.net_pnl
    );
}

#[tokio::test]
async fn band_excursion_closes_all_and_restarts_the_cooldown() {
    let mut harness = Harness::new();
    let entry_index = harness.run_until_both_open().await;

    // Grind upward slowly enough that no stop is reached; the band
    // excursion close fires on the signal cadence instead.
    let entry_price = 100.3_f64;
    for step in 1..=30 {
        let price = Decimal::try_from(entry_price + 0.02 * step as f64).unwrap();
        harness.feed_price(price.round_dp(2)).await;
        if harness.worker.state() == SymbolState::Idle {
            break;
        }
    }
    assert_eq!(harness.worker.state(), SymbolState::Idle);

    {
        let ledger = harness.ledger.lock().await;
        let trades = ledger.closed_trades();
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::SignalClose));
        // Long first, then short, on the same tick.
        assert_eq!(trades[0].side, Side::Long);
        assert_eq!(trades[1].side, Side::Short);
        assert_eq!(trades[0].exit_time, trades[1].exit_time);
        assert_eq!(trades[0].exit_price, trades[1].exit_price);
    }

    // The signal close restarted the cooldown (180 s for the aggressive
    // variant): 20 s of perfectly entryable oscillation changes nothing.
    harness.feed_oscillation(200).await;
    assert_eq!(harness.worker.state(), SymbolState::Idle);
    assert_eq!(harness.ledger.lock().await.closed_trades().len(), 2);

    // Successive entries stay at least a cooldown apart (invariant 6).
    let _ = entry_index;
}

#[tokio::test]
async fn cooldown_spacing_between_successive_entries() {
    let mut harness = Harness::new();
    let first_entry = harness.run_until_both_open().await;

    // Flush the straddle with the sharp jump + pull-back.
    harness.feed_price(dec!(102)).await;
    harness.feed_price(dec!(100.5)).await;
    assert_eq!(harness.worker.state(), SymbolState::Idle);

    // Resume the oscillation until the next entry fires.
    let second_entry = harness.run_until_both_open().await;
    let elapsed_ms = (second_entry - first_entry) * TICK_INTERVAL_MS;
    assert!(
        elapsed_ms >= 180_000,
        "entries only {elapsed_ms} ms apart, cooldown is 180 s"
    );
}

/// A gateway whose short-opening leg always fails, for the atomic
/// two-leg reversion path.
struct ShortRejectingGateway {
    inner: PaperGateway,
    orders: std::sync::Mutex<Vec<OrderIntent>>,
}

#[async_trait]
impl ExecutionGateway for ShortRejectingGateway {
    async fn place_market_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError> {
        self.orders.lock().unwrap().push(intent.clone());
        if intent.side == Side::Short && !intent.reduce_only {
            return Err(OrderError::Rejected("insufficient margin".into()));
        }
        self.inner.place_market_order(intent).await
    }

    async fn place_limit_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError> {
        self.inner.place_limit_order(intent).await
    }
}

#[tokio::test]
async fn failed_short_leg_reverts_the_long_leg() {
    let gateway = Arc::new(ShortRejectingGateway {
        inner: PaperGateway::new(simulation()),
        orders: std::sync::Mutex::new(Vec::new()),
    });
    let ledger = Arc::new(Mutex::new(Ledger::new(dec!(10000), simulation())));
    let (event_tx, _) = broadcast::channel(256);
    let mut worker = SymbolWorker::new(
        coin_params(),
        engine_settings(),
        &simulation(),
        Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
        Arc::clone(&ledger),
        event_tx,
    )
    .unwrap();

    for index in 0..700 {
        let tick = oscillation_tick(index);
        gateway.inner.record_tick(&tick);
        worker.process_tick(tick).await.unwrap();
        assert_eq!(worker.state(), SymbolState::Idle, "no single-sided position may survive");
    }

    assert_eq!(ledger.lock().await.open_position_count(), 0);

    let orders = gateway.orders.lock().unwrap();
    // At least one aborted attempt: open long, failed short, revert long.
    let open_longs = orders.iter().filter(|o| o.side == Side::Long && !o.reduce_only).count();
    let failed_shorts = orders.iter().filter(|o| o.side == Side::Short && !o.reduce_only).count();
    let reverts = orders.iter().filter(|o| o.side == Side::Long && o.reduce_only).count();
    assert!(open_longs >= 1);
    assert_eq!(open_longs, failed_shorts);
    assert_eq!(open_longs, reverts);
}

#[tokio::test]
async fn replaying_the_same_stream_reproduces_the_trade_log() {
    async fn run_once() -> Vec<(Side, Decimal, Decimal, i64, ExitReason, Decimal)> {
        let mut harness = Harness::new();
        harness.run_until_both_open().await;
        harness.feed_price(dec!(102)).await;
        harness.feed_price(dec!(100.5)).await;
        harness.feed_oscillation(100).await;

        let ledger = harness.ledger.lock().await;
        let result = ledger
            .closed_trades()
            .iter()
            .map(|t| {
                (
                    t.side,
                    t.entry_price,
                    t.exit_price,
                    t.exit_time.timestamp_millis(),
                    t.exit_reason,
                    t.net_pnl,
                )
            })
            .collect();
        result
    }

    let first = run_once().await;
    let second = run_once().await;
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[tokio::test]
async fn out_of_order_and_duplicate_ticks_are_dropped() {
    let mut harness = Harness::new();
    harness.feed_oscillation(10).await;

    // A strictly older tick and an exact duplicate both disappear
    // without disturbing the buffer.
    let stale = tick_at(2, PATTERN[2]);
    harness.feed(stale).await;
    let duplicate = oscillation_tick(9);
    harness.feed(duplicate).await;

    let diagnostics = harness.worker.diagnostics();
    assert_eq!(diagnostics.out_of_order_dropped, 1);
    assert_eq!(diagnostics.duplicates_dropped, 1);
    assert_eq!(diagnostics.ticks_processed, 10);
}

#[tokio::test]
async fn open_positions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let persistence_settings = configuration::Persistence {
        trade_log_path: dir.path().join("trades.jsonl").to_string_lossy().into_owned(),
        open_positions_path: dir.path().join("open.json").to_string_lossy().into_owned(),
    };

    let open_before = {
        let gateway = Arc::new(PaperGateway::new(simulation()));
        let persistence = LedgerPersistence::new(&persistence_settings).unwrap();
        let ledger = Arc::new(Mutex::new(
            Ledger::new(dec!(10000), simulation()).with_persistence(persistence),
        ));
        let (event_tx, _) = broadcast::channel(256);
        let worker = SymbolWorker::new(
            coin_params(),
            engine_settings(),
            &simulation(),
            Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
            Arc::clone(&ledger),
            event_tx,
        )
        .unwrap();
        let mut harness = Harness {
            worker,
            gateway,
            ledger,
            next_index: 0,
        };
        harness.run_until_both_open().await;
        harness.worker.finalize().await;
        let ledger = harness.ledger.lock().await;
        ledger.open_positions()
    };
    assert_eq!(open_before.len(), 2);

    // A fresh process: the ledger reloads the snapshot and the worker
    // adopts both legs.
    let persistence = LedgerPersistence::new(&persistence_settings).unwrap();
    let mut ledger = Ledger::new(dec!(10000), simulation()).with_persistence(persistence);
    let resumed = ledger.resume_open_positions().unwrap();
    assert_eq!(resumed, open_before);

    let gateway = Arc::new(PaperGateway::new(simulation()));
    let (event_tx, _) = broadcast::channel(256);
    let mut worker = SymbolWorker::new(
        coin_params(),
        engine_settings(),
        &simulation(),
        gateway as Arc<dyn ExecutionGateway>,
        Arc::new(Mutex::new(ledger)),
        event_tx,
    )
    .unwrap();
    for position in resumed {
        worker.adopt(position).unwrap();
    }
    assert_eq!(worker.state(), SymbolState::BothOpen);
}
