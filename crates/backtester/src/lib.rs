//! # Replay Harness
//!
//! Replays a recorded tick stream through the exact per-symbol worker
//! code used live, single-threaded and in recorded order, so two runs
//! over the same recording produce identical closed-trade logs. Nothing
//! here uses wall-clock time or randomness; fills come from the paper
//! gateway at the contemporaneous recorded tick.
//!
//! Tick recordings are JSON lines, one `Tick` per line, timestamps
//! non-decreasing per symbol. Replay never writes the live persistence
//! files.

pub mod error;

pub use error::ReplayError;

use configuration::{CoinParams, Config};
use core_types::{ClosedTrade, Tick};
use engine::SymbolWorker;
use executor::{ExecutionGateway, PaperGateway};
use indicatif::{ProgressBar, ProgressStyle};
use ledger::{Ledger, PerformanceSnapshot};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// The outcome of one replay run.
#[derive(Debug)]
pub struct ReplayReport {
    pub snapshot: PerformanceSnapshot,
    pub trades: Vec<ClosedTrade>,
    /// Ticks whose symbol had no coin parameters.
    pub skipped_unknown_symbol: u64,
}

/// Drives recorded ticks through per-symbol workers deterministically.
pub struct ReplayHarness {
    config: Config,
    coins: HashMap<String, CoinParams>,
    show_progress: bool,
}

impl ReplayHarness {
    pub fn new(config: Config, coins: HashMap<String, CoinParams>) -> Self {
        Self {
            config,
            coins,
            show_progress: true,
        }
    }

    /// Disables the progress bar (tests, scripted runs).
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Loads a JSON-lines tick recording.
    pub fn load_ticks(path: &Path) -> Result<Vec<Tick>, ReplayError> {
        let reader = BufReader::new(File::open(path)?);
        let mut ticks = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let tick = serde_json::from_str::<Tick>(&line)
                .map_err(|source| ReplayError::MalformedTick { line: number + 1, source })?;
            ticks.push(tick);
        }
        Ok(ticks)
    }

    /// Replays the stream and reports the resulting performance.
    pub async fn run(&self, ticks: &[Tick]) -> Result<ReplayReport, ReplayError> {
        let gateway = Arc::new(PaperGateway::new(self.config.simulation.clone()));
        let ledger = Arc::new(Mutex::new(Ledger::new(
            self.config.engine.initial_equity,
            self.config.simulation.clone(),
        )));
        // Workers still publish events; replay just has no subscriber.
        let (event_tx, _) = broadcast::channel::<events::EngineEvent>(1024);

        let mut workers: HashMap<String, SymbolWorker> = HashMap::new();
        let mut skipped_unknown_symbol = 0u64;
        let mut last_price: HashMap<String, Decimal> = HashMap::new();
        let mut last_timestamp = 0i64;

        let progress = if self.show_progress {
            let bar = ProgressBar::new(ticks.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                    .progress_chars("=>-"),
            );
            Some(bar)
        } else {
            None
        };

        for tick in ticks {
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            let worker = match workers.entry(tick.symbol.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let Some(params) = self.coins.get(&tick.symbol) else {
                        skipped_unknown_symbol += 1;
                        if skipped_unknown_symbol == 1 {
                            warn!(symbol = %tick.symbol, "recording contains a symbol with no coin parameters");
                        }
                        continue;
                    };
                    entry.insert(SymbolWorker::new(
                        params.clone(),
                        self.config.engine.clone(),
                        &self.config.simulation,
                        Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
                        Arc::clone(&ledger),
                        event_tx.clone(),
                    )?)
                }
            };

            gateway.record_tick(tick);
            last_price.insert(tick.symbol.clone(), tick.price);
            last_timestamp = last_timestamp.max(tick.timestamp);
            worker.process_tick(tick.clone()).await?;
        }

        if let Some(bar) = progress {
            bar.finish_with_message("replay complete");
        }
        for worker in workers.values() {
            worker.finalize().await;
        }

        let ledger = ledger.lock().await;
        // Snapshot time comes from the recording, not the wall clock.
        let now = chrono::DateTime::from_timestamp_millis(last_timestamp)
            .unwrap_or(chrono::DateTime::UNIX_EPOCH);
        let snapshot = PerformanceSnapshot::compute(&ledger, &last_price, now);
        info!(
            trades = ledger.closed_trades().len(),
            equity = %ledger.account_equity(),
            "replay finished"
        );
        Ok(ReplayReport {
            snapshot,
            trades: ledger.closed_trades().to_vec(),
            skipped_unknown_symbol,
        })
    }
}
