//! # Engine
//!
//! The scheduler that binds the tick buffers, indicators, signal
//! generator, trailing stops, gateway, and ledger together across many
//! symbols.
//!
//! ## Concurrency model
//!
//! One owner task per symbol. Each worker exclusively owns its tick
//! buffer, open legs, and cooldown clock, so no locking exists on the hot
//! path; the only shared state is the ledger behind a single mutex, and
//! coin parameters, which are read-only after startup.
//!
//! Live channels are lossy (oldest ticks dropped under backpressure and
//! counted) because stale ticks are valueless for live trading; replay
//! channels block the producer instead so recorded streams replay
//! deterministically.
//!
//! A global shutdown signal lets every worker finish its current tick and
//! exit. Open positions are NOT auto-closed on shutdown: they persist to
//! the snapshot and resume on restart, because flattening on shutdown
//! would be indistinguishable from a trailing-stop exit in the records.

pub mod error;
pub mod worker;

pub use error::EngineError;
pub use worker::{SymbolState, SymbolWorker, WorkerDiagnostics};

use configuration::{CoinParams, Config};
use core_types::{Position, Tick};
use events::EngineEvent;
use executor::{ExecutionGateway, MarketObserver};
use ledger::Ledger;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Capacity of the engine-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// One symbol's inbound tick stream.
pub enum TickReceiver {
    /// Live mode: bounded and lossy. On overflow the oldest buffered
    /// ticks are dropped and counted; the newest always gets through.
    Lossy(broadcast::Receiver<Tick>),
    /// Replay mode: the producer blocks instead, preserving determinism.
    Ordered(mpsc::Receiver<Tick>),
}

/// The long-running orchestrator: spawns one worker per subscribed
/// symbol and supervises them until shutdown.
pub struct Engine {
    config: Config,
    coins: HashMap<String, CoinParams>,
    gateway: Arc<dyn ExecutionGateway>,
    observer: Option<Arc<dyn MarketObserver>>,
    ledger: Arc<Mutex<Ledger>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        config: Config,
        coins: HashMap<String, CoinParams>,
        gateway: Arc<dyn ExecutionGateway>,
        observer: Option<Arc<dyn MarketObserver>>,
        ledger: Arc<Mutex<Ledger>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            coins,
            gateway,
            observer,
            ledger,
            event_tx,
        }
    }

    /// A fresh subscription to the engine's event stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Runs one worker per stream until every stream ends or shutdown is
    /// signalled. Resumed positions are handed to their workers first.
    pub async fn run(
        &self,
        mut streams: HashMap<String, TickReceiver>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), EngineError> {
        let resumed = {
            let mut ledger = self.ledger.lock().await;
            ledger.resume_open_positions()?
        };
        let mut resumed_by_symbol: HashMap<String, Vec<Position>> = HashMap::new();
        for position in resumed {
            resumed_by_symbol
                .entry(position.symbol.clone())
                .or_default()
                .push(position);
        }

        let mut join = JoinSet::new();
        let mut spawned = 0usize;
        for (symbol, stream) in streams.drain() {
            let Some(params) = self.coins.get(&symbol) else {
                warn!(%symbol, "no coin parameters for subscribed symbol; stream ignored");
                continue;
            };
            let mut worker = SymbolWorker::new(
                params.clone(),
                self.config.engine.clone(),
                &self.config.simulation,
                Arc::clone(&self.gateway),
                Arc::clone(&self.ledger),
                self.event_tx.clone(),
            )?;
            for position in resumed_by_symbol.remove(&symbol).unwrap_or_default() {
                worker.adopt(position)?;
            }
            let observer = self.observer.clone();
            let shutdown = shutdown.clone();
            join.spawn(run_worker(worker, stream, observer, shutdown));
            spawned += 1;
        }

        for (symbol, positions) in &resumed_by_symbol {
            warn!(
                %symbol,
                count = positions.len(),
                "resumed positions for a symbol with no stream; left open in the ledger"
            );
        }

        info!(workers = spawned, "engine is running");
        while let Some(result) = join.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("engine stopped");
        Ok(())
    }
}

/// The per-symbol receive loop: strict tick order within the symbol, the
/// current tick always finishes before shutdown is honored.
async fn run_worker(
    mut worker: SymbolWorker,
    stream: TickReceiver,
    observer: Option<Arc<dyn MarketObserver>>,
    mut shutdown: watch::Receiver<bool>,
) {
    match stream {
        TickReceiver::Lossy(mut rx) => loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = rx.recv() => match received {
                    Ok(tick) => {
                        if let Some(observer) = &observer {
                            observer.record_tick(&tick);
                        }
                        if worker.process_tick(tick).await.is_err() {
                            // Fatal for this symbol; context already logged.
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        worker.note_channel_lag(skipped);
                        warn!(symbol = %worker.symbol(), skipped, "tick channel overflowed; oldest dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        },
        TickReceiver::Ordered(mut rx) => loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = rx.recv() => match received {
                    Some(tick) => {
                        if let Some(observer) = &observer {
                            observer.record_tick(&tick);
                        }
                        if worker.process_tick(tick).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        },
    }
    worker.finalize().await;
}
