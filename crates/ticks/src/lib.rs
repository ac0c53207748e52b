//! # Tick Buffer & Indicators
//!
//! This crate owns the per-symbol rolling tick window and every indicator
//! computed from it. All indicators are pure functions over a tick slice:
//! they never mutate, and they fail as "undefined" (`None`) rather than
//! erroring, leaving the caller to decide whether to skip the tick.
//!
//! No candle data exists anywhere in this crate. VWAP replaces SMA,
//! tick-to-tick variance replaces candle ATR, and the ATR-like measure is
//! built from fixed-count tick sub-windows.

pub mod buffer;
pub mod error;
pub mod indicators;

pub use buffer::TickBuffer;
pub use error::TickError;
pub use indicators::IndicatorSnapshot;
