use clap::ValueEnum;
use rust_decimal::Decimal;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineSettings,
    pub simulation: Simulation,
    pub persistence: Persistence,
    pub logging: Logging,
}

/// Tunables for the tick-processing pipeline shared by all symbols.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// The starting account equity for paper trading and replay.
    pub initial_equity: Decimal,
    /// Capacity of each per-symbol tick buffer.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Lookback window (in seconds) for the indicator snapshot.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Fixed tick count of each ATR-like volatility sub-window.
    #[serde(default = "default_atr_subwindow_ticks")]
    pub atr_subwindow_ticks: usize,
    /// The signal generator runs once every this many ticks per symbol.
    #[serde(default = "default_signal_every_ticks")]
    pub signal_every_ticks: u64,
    /// The indicator snapshot is refreshed every this many ticks.
    #[serde(default = "default_snapshot_every_ticks")]
    pub snapshot_every_ticks: u64,
    /// Minimum buffered ticks before the signal generator is consulted.
    #[serde(default = "default_signal_min_ticks")]
    pub signal_min_ticks: usize,
    /// Capacity of each per-symbol live tick channel. Overflow drops the
    /// oldest buffered ticks and increments a counter; replay channels
    /// block the producer instead.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    10_000
}
fn default_lookback_secs() -> u64 {
    600
}
fn default_atr_subwindow_ticks() -> usize {
    100
}
fn default_signal_every_ticks() -> u64 {
    10
}
fn default_snapshot_every_ticks() -> u64 {
    5
}
fn default_signal_min_ticks() -> usize {
    100
}
fn default_channel_capacity() -> usize {
    1024
}

/// Contains parameters for the paper execution and P&L model.
#[derive(Debug, Clone, Deserialize)]
pub struct Simulation {
    /// The fee charged for a market ("taker") fill. 0.0005 is 0.05%.
    pub taker_fee_pct: Decimal,
    /// The fee charged for a limit ("maker") fill. 0.0002 is 0.02%.
    pub maker_fee_pct: Decimal,
    /// Assumed slippage per side, folded into gross P&L on close.
    pub slippage_pct: Decimal,
    /// Deadline for a market order round-trip, in seconds.
    #[serde(default = "default_market_deadline_secs")]
    pub market_order_deadline_secs: u64,
    /// Deadline for a limit order to fill before it is cancelled.
    #[serde(default = "default_limit_deadline_secs")]
    pub limit_order_deadline_secs: u64,
}

fn default_market_deadline_secs() -> u64 {
    5
}
fn default_limit_deadline_secs() -> u64 {
    30
}

/// Where the engine writes its two persisted artifacts.
#[derive(Debug, Clone, Deserialize)]
pub struct Persistence {
    /// Append-only closed-trade log (JSON lines).
    pub trade_log_path: String,
    /// Open-position snapshot, overwritten on every change.
    pub open_positions_path: String,
}

/// Controls the `tracing` subscriber installed at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    /// Filter directive, e.g. "info" or "straddle=debug,engine=trace".
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit one-line JSON records instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

// --- Execution Mode ---
// Defines the possible data environments for the `run` command. Order flow
// is always paper; the mode only selects the market-data endpoint.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ExecutionMode {
    /// Production market data, simulated local execution.
    Paper,
    /// Testnet market data, simulated local execution.
    Testnet,
}
