use configuration::{CoinParams, EngineSettings, Simulation};
use core_types::{ExitReason, OrderIntent, Position, Side, Tick};
use events::EngineEvent;
use executor::{with_retry, ExecutionGateway, RetryPolicy};
use ledger::{Ledger, LedgerError};
use risk::{PositionSizer, RiskError, TrailingStop, TrailingStopSettings};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::sync::Arc;
use strategies::{SignalAction, SignalContext, SignalGenerator};
use ticks::{IndicatorSnapshot, TickBuffer, TickError};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::EngineError;

/// The per-symbol position state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    Idle,
    LongOnly,
    ShortOnly,
    BothOpen,
}

/// Counters a worker keeps about its own stream hygiene and signal flow.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerDiagnostics {
    pub ticks_processed: u64,
    pub duplicates_dropped: u64,
    pub out_of_order_dropped: u64,
    pub channel_lag_dropped: u64,
    pub signals_generated: u64,
    pub entries_aborted: u64,
    pub entries_skipped_same_tick: u64,
}

/// One open leg: the ledger-visible position plus its live stop.
struct OpenLeg {
    position: Position,
    stop: TrailingStop,
}

/// The exclusive owner of one symbol's trading state.
///
/// Everything mutable here (tick buffer, open legs, cooldown clock,
/// indicator cache) is touched only by this worker; the only shared
/// state is the ledger, mutated under its mutex in short critical
/// sections. The per-tick processing order is fixed: append, refresh
/// indicators, evaluate stops (Long before Short), then on the signal
/// cadence consult the generator. Entries never happen on a tick that
/// closed a position.
pub struct SymbolWorker {
    symbol: String,
    params: CoinParams,
    engine: EngineSettings,
    generator: SignalGenerator,
    sizer: PositionSizer,
    gateway: Arc<dyn ExecutionGateway>,
    ledger: Arc<Mutex<Ledger>>,
    event_tx: broadcast::Sender<EngineEvent>,
    buffer: TickBuffer,
    snapshot: Option<IndicatorSnapshot>,
    ticks_since_snapshot: u64,
    ticks_since_signal: u64,
    last_tick_key: Option<(i64, Decimal, Decimal)>,
    last_entry_ms: Option<i64>,
    long: Option<OpenLeg>,
    short: Option<OpenLeg>,
    diagnostics: WorkerDiagnostics,
    market_deadline_secs: u64,
}

impl SymbolWorker {
    pub fn new(
        params: CoinParams,
        engine: EngineSettings,
        sim: &Simulation,
        gateway: Arc<dyn ExecutionGateway>,
        ledger: Arc<Mutex<Ledger>>,
        event_tx: broadcast::Sender<EngineEvent>,
    ) -> Result<Self, EngineError> {
        let generator = SignalGenerator::new(params.clone())?;
        let sizer = PositionSizer::new(&params)?;
        Ok(Self {
            symbol: params.symbol.clone(),
            buffer: TickBuffer::new(engine.buffer_capacity),
            market_deadline_secs: sim.market_order_deadline_secs,
            params,
            engine,
            generator,
            sizer,
            gateway,
            ledger,
            event_tx,
            snapshot: None,
            ticks_since_snapshot: 0,
            ticks_since_signal: 0,
            last_tick_key: None,
            last_entry_ms: None,
            long: None,
            short: None,
            diagnostics: WorkerDiagnostics::default(),
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn state(&self) -> SymbolState {
        match (&self.long, &self.short) {
            (None, None) => SymbolState::Idle,
            (Some(_), None) => SymbolState::LongOnly,
            (None, Some(_)) => SymbolState::ShortOnly,
            (Some(_), Some(_)) => SymbolState::BothOpen,
        }
    }

    pub fn diagnostics(&self) -> WorkerDiagnostics {
        self.diagnostics
    }

    pub fn note_channel_lag(&mut self, skipped: u64) {
        self.diagnostics.channel_lag_dropped += skipped;
    }

    /// Adopts a still-open position persisted by a previous run. The stop
    /// resumes from its mirrored extreme and stop price; cooldown restarts
    /// from the position's entry time.
    pub fn adopt(&mut self, position: Position) -> Result<(), EngineError> {
        let settings = self.stop_settings();
        let stop = TrailingStop::resume(
            position.side,
            decimal_to_f64(position.entry_price)?,
            decimal_to_f64(position.extreme_favorable_price)?,
            decimal_to_f64(position.current_stop_price)?,
            settings,
        )?;
        let slot = match position.side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        };
        if slot.is_some() {
            return Err(EngineError::InvariantViolation {
                symbol: self.symbol.clone(),
                detail: format!("two {} positions in the resume snapshot", position.side),
            });
        }
        self.last_entry_ms = Some(
            self.last_entry_ms
                .unwrap_or(i64::MIN)
                .max(position.entry_time.timestamp_millis()),
        );
        info!(symbol = %self.symbol, side = %position.side, "resumed open position");
        *slot = Some(OpenLeg { position, stop });
        Ok(())
    }

    /// Processes one tick through the fixed pipeline. Returns `Err` only
    /// on a fatal invariant violation; everything else recovers locally.
    pub async fn process_tick(&mut self, tick: Tick) -> Result<(), EngineError> {
        if tick.symbol != self.symbol {
            warn!(expected = %self.symbol, got = %tick.symbol, "tick routed to wrong worker");
            return Ok(());
        }

        // Step 0: dedup and ordering hygiene before anything else.
        let key = tick.dedup_key();
        if let Some(last) = self.last_tick_key {
            if key.0 < last.0 {
                self.diagnostics.out_of_order_dropped += 1;
                debug!(symbol = %self.symbol, got = key.0, last = last.0, "dropped out-of-order tick");
                return Ok(());
            }
            if key == last {
                self.diagnostics.duplicates_dropped += 1;
                return Ok(());
            }
        }

        // Step 1: append to the buffer.
        match self.buffer.push(tick.clone()) {
            Ok(()) => {}
            Err(TickError::OutOfOrder { .. }) => {
                self.diagnostics.out_of_order_dropped += 1;
                return Ok(());
            }
        }
        self.last_tick_key = Some(key);
        self.diagnostics.ticks_processed += 1;

        // Step 2: refresh the indicator snapshot on its throttle.
        self.ticks_since_snapshot += 1;
        if self.snapshot.is_none() || self.ticks_since_snapshot >= self.engine.snapshot_every_ticks {
            self.ticks_since_snapshot = 0;
            self.snapshot = IndicatorSnapshot::compute(
                &self.buffer,
                self.engine.lookback_secs,
                self.engine.atr_subwindow_ticks,
            );
        }

        // Step 3: stops before anything may open. Long evaluates first so
        // simultaneous triggers resolve deterministically.
        let mut closed_this_tick = false;
        for side in [Side::Long, Side::Short] {
            if let Some(trigger) = self.evaluate_stop(side, &tick)? {
                closed_this_tick |= self.close_leg(side, trigger.0, trigger.1, &tick).await?;
            }
        }

        // Step 4: the signal generator runs on a coarser cadence.
        self.ticks_since_signal += 1;
        if self.ticks_since_signal >= self.engine.signal_every_ticks
            && self.buffer.len() >= self.engine.signal_min_ticks
        {
            self.ticks_since_signal = 0;
            if let Some(snapshot) = self.snapshot.clone() {
                let ctx = SignalContext {
                    now_ms: tick.timestamp,
                    last_entry_ms: self.last_entry_ms,
                    open_long: self.long.is_some(),
                    open_short: self.short.is_some(),
                };
                match self.generator.evaluate(&snapshot, &ctx) {
                    SignalAction::Hold => {}
                    SignalAction::EntryBoth { strength } => {
                        self.diagnostics.signals_generated += 1;
                        if closed_this_tick {
                            // Implicit one-tick cooldown: never enter on
                            // the tick that closed a position.
                            self.diagnostics.entries_skipped_same_tick += 1;
                        } else {
                            self.enter_both(&tick, &snapshot, strength).await?;
                        }
                    }
                    SignalAction::CloseAll { reason } => {
                        info!(symbol = %self.symbol, %reason, "signal close");
                        self.close_all(&tick).await?;
                        // Scenario-level rule: a signal close restarts the
                        // cooldown clock.
                        self.last_entry_ms = Some(tick.timestamp);
                    }
                }
            }
        }

        Ok(())
    }

    /// Runs the stop machinery for one side. Returns the exit price and
    /// reason when the position must close on this tick.
    fn evaluate_stop(
        &mut self,
        side: Side,
        tick: &Tick,
    ) -> Result<Option<(Decimal, ExitReason)>, EngineError> {
        let atr_pct = self.snapshot.as_ref().and_then(|s| s.atr_pct());
        let leg = match side {
            Side::Long => self.long.as_mut(),
            Side::Short => self.short.as_mut(),
        };
        let Some(leg) = leg else {
            return Ok(None);
        };
        let price = decimal_to_f64(tick.price)?;

        let Some(atr_pct) = atr_pct else {
            // No usable snapshot yet (warm-up after resume): only the
            // liquidation guard can act.
            if leg.stop.guard_triggered(price) {
                return Ok(Some((tick.price, ExitReason::LiquidationGuard)));
            }
            return Ok(None);
        };

        let update = match leg.stop.update(price, atr_pct) {
            Ok(update) => update,
            Err(e @ RiskError::StopMonotonicityViolated { .. }) => {
                return Err(self.fatal(e.to_string()));
            }
            Err(e) => {
                warn!(symbol = %self.symbol, error = %e, "skipping stop evaluation for this tick");
                return Ok(None);
            }
        };

        // Mirror the stop state so the persisted snapshot stays honest.
        leg.position.extreme_favorable_price = f64_to_decimal(leg.stop.extreme())?;
        leg.position.current_stop_price = f64_to_decimal(update.stop_price)?;

        Ok(update.triggered.map(|reason| {
            let exit_price = match reason {
                // Stop exits settle at the stop level, not the tick that
                // pierced it.
                ExitReason::TrailingStop | ExitReason::HardStop => {
                    f64_to_decimal(update.exit_price).unwrap_or(tick.price)
                }
                _ => tick.price,
            };
            (exit_price, reason)
        }))
    }

    /// Closes one leg through the gateway and settles it in the ledger.
    /// Returns true when the leg actually closed; a gateway failure leaves
    /// the position open for the next tick to retry.
    async fn close_leg(
        &mut self,
        side: Side,
        exit_price: Decimal,
        reason: ExitReason,
        tick: &Tick,
    ) -> Result<bool, EngineError> {
        let Some(leg) = (match side {
            Side::Long => self.long.as_ref(),
            Side::Short => self.short.as_ref(),
        }) else {
            return Ok(false);
        };
        let quantity = leg.position.quantity;

        let intent = OrderIntent::market(&self.symbol, side, quantity, true);
        let policy = RetryPolicy::market(self.market_deadline_secs);
        let fill = match with_retry(policy, || self.gateway.place_market_order(&intent)).await {
            Ok(fill) => fill,
            Err(e) => {
                warn!(symbol = %self.symbol, side = %side, error = %e, "close order failed; will retry next tick");
                return Ok(false);
            }
        };

        let (trade, equity) = {
            let mut ledger = self.ledger.lock().await;
            let trade = match ledger.close_position(
                &self.symbol,
                side,
                exit_price,
                tick.time(),
                reason,
                fill.fee_rate,
            ) {
                Ok(trade) => trade,
                Err(e @ LedgerError::PositionNotFound { .. }) => {
                    return Err(self.fatal(format!("ledger out of sync on close: {e}")));
                }
                Err(e) => return Err(e.into()),
            };
            (trade, ledger.account_equity())
        };

        match side {
            Side::Long => self.long = None,
            Side::Short => self.short = None,
        }

        let timestamp = trade.exit_time;
        let _ = self.event_tx.send(EngineEvent::TradeClosed(trade));
        let _ = self.event_tx.send(EngineEvent::EquityUpdated {
            timestamp,
            account_equity: equity,
        });
        Ok(true)
    }

    /// Closes every open position for the symbol at the tick price (the
    /// CLOSE_ALL path, bypassing the trailing stops). Long first.
    async fn close_all(&mut self, tick: &Tick) -> Result<(), EngineError> {
        for side in [Side::Long, Side::Short] {
            let open = match side {
                Side::Long => self.long.is_some(),
                Side::Short => self.short.is_some(),
            };
            if open {
                self.close_leg(side, tick.price, ExitReason::SignalClose, tick).await?;
            }
        }
        Ok(())
    }

    /// Attempts the atomic two-leg entry. Either both legs open or the
    /// filled one is reverted at market and nothing persists.
    async fn enter_both(
        &mut self,
        tick: &Tick,
        snapshot: &IndicatorSnapshot,
        strength: f64,
    ) -> Result<(), EngineError> {
        // Equity is read once at the start of the attempt; a concurrent
        // close changing it afterwards does not re-run sizing.
        let equity = {
            let ledger = self.ledger.lock().await;
            ledger.account_equity()
        };
        let quantity = match self.sizer.quantity(equity, tick.price) {
            Ok(quantity) => quantity,
            Err(e) => {
                debug!(symbol = %self.symbol, error = %e, "entry skipped by sizing");
                return Ok(());
            }
        };

        let policy = RetryPolicy::market(self.market_deadline_secs);
        let long_intent = OrderIntent::market(&self.symbol, Side::Long, quantity, false);
        let long_fill = match with_retry(policy, || self.gateway.place_market_order(&long_intent)).await
        {
            Ok(fill) => fill,
            Err(e) => {
                self.abort_entry(format!("long leg failed: {e}"));
                return Ok(());
            }
        };

        let short_intent = OrderIntent::market(&self.symbol, Side::Short, quantity, false);
        let short_fill =
            match with_retry(policy, || self.gateway.place_market_order(&short_intent)).await {
                Ok(fill) => fill,
                Err(e) => {
                    // Revert the filled long leg so no single-sided
                    // position survives an attempted BOTH.
                    let revert = OrderIntent::market(&self.symbol, Side::Long, quantity, true);
                    if let Err(revert_err) =
                        with_retry(policy, || self.gateway.place_market_order(&revert)).await
                    {
                        error!(
                            symbol = %self.symbol,
                            error = %revert_err,
                            "failed to revert long leg after short leg failure"
                        );
                    }
                    self.abort_entry(format!("short leg failed: {e}"));
                    return Ok(());
                }
            };

        let signal_id = Uuid::new_v4();
        let atr_pct = snapshot.atr_pct().unwrap_or(0.0);
        let settings = self.stop_settings();

        let mut legs = Vec::with_capacity(2);
        for (side, fill) in [(Side::Long, long_fill), (Side::Short, short_fill)] {
            let entry_price = fill.fill_price;
            let stop = TrailingStop::initialize(side, decimal_to_f64(entry_price)?, atr_pct, settings)?;
            let position = Position {
                position_id: Uuid::new_v4(),
                symbol: self.symbol.clone(),
                side,
                entry_price,
                entry_time: fill.timestamp,
                quantity,
                leverage: self.params.leverage,
                extreme_favorable_price: entry_price,
                current_stop_price: f64_to_decimal(stop.current_stop())?,
                opened_by_signal_id: signal_id,
            };
            legs.push(OpenLeg { position, stop });
        }

        {
            let mut ledger = self.ledger.lock().await;
            for leg in &legs {
                if let Err(e @ LedgerError::DuplicateSide { .. }) =
                    ledger.open_position(leg.position.clone())
                {
                    return Err(self.fatal(e.to_string()));
                }
            }
        }

        for leg in &legs {
            let _ = self.event_tx.send(EngineEvent::PositionOpened(leg.position.clone()));
        }
        let mut legs = legs.into_iter();
        self.long = legs.next();
        self.short = legs.next();
        self.last_entry_ms = Some(tick.timestamp);

        info!(
            symbol = %self.symbol,
            price = %tick.price,
            %quantity,
            strength,
            "two-way entry opened"
        );
        Ok(())
    }

    fn abort_entry(&mut self, detail: String) {
        self.diagnostics.entries_aborted += 1;
        warn!(symbol = %self.symbol, detail, "entry aborted");
        let _ = self.event_tx.send(EngineEvent::EntryAborted {
            symbol: self.symbol.clone(),
            detail,
        });
    }

    /// Flushes the live stop state into the ledger and persists the open
    /// snapshot. Called when the worker exits; positions stay open.
    pub async fn finalize(&self) {
        let mut ledger = self.ledger.lock().await;
        for leg in self.long.iter().chain(self.short.iter()) {
            let _ = ledger.update_stop_state(
                &self.symbol,
                leg.position.side,
                leg.position.extreme_favorable_price,
                leg.position.current_stop_price,
            );
        }
        if let Err(e) = ledger.persist_open_positions() {
            warn!(symbol = %self.symbol, error = %e, "failed to persist open positions on exit");
        }
        let d = self.diagnostics;
        info!(
            symbol = %self.symbol,
            ticks = d.ticks_processed,
            duplicates = d.duplicates_dropped,
            out_of_order = d.out_of_order_dropped,
            lagged = d.channel_lag_dropped,
            signals = d.signals_generated,
            aborted = d.entries_aborted,
            "worker finished"
        );
    }

    fn stop_settings(&self) -> TrailingStopSettings {
        TrailingStopSettings {
            hard_stop_atr_multiplier: self.params.hard_stop_atr_multiplier,
            min_loss_floor_pct: self.params.min_loss_floor_pct,
            leverage: self.params.leverage,
        }
    }

    /// Builds the fatal error and dumps enough context for manual
    /// intervention before the worker exits.
    fn fatal(&self, detail: String) -> EngineError {
        error!(
            symbol = %self.symbol,
            state = ?self.state(),
            last_tick = ?self.last_tick_key,
            long = ?self.long.as_ref().map(|l| &l.position),
            short = ?self.short.as_ref().map(|l| &l.position),
            detail,
            "invariant violation; symbol worker exiting"
        );
        let _ = self.event_tx.send(EngineEvent::WorkerFailed {
            symbol: self.symbol.clone(),
            detail: detail.clone(),
        });
        EngineError::InvariantViolation {
            symbol: self.symbol.clone(),
            detail,
        }
    }
}

fn decimal_to_f64(value: Decimal) -> Result<f64, EngineError> {
    value.to_f64().ok_or_else(|| {
        EngineError::Configuration(format!("decimal {value} is not representable as f64"))
    })
}

fn f64_to_decimal(value: f64) -> Result<Decimal, EngineError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(8))
        .ok_or_else(|| EngineError::Configuration(format!("float {value} is not a valid price")))
}
