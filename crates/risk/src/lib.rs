//! # Risk: Trailing Stops & Sizing
//!
//! Two concerns live here, both pure with respect to the rest of the
//! system:
//!
//! - `TrailingStop`: the per-position exit state machine. It tracks the
//!   favorable extreme, scales its distance by the ATR regime, tightens as
//!   profit accrues, and never loosens. A hard-stop floor derived from ATR
//!   caps the worst-case loss, and a liquidation guard closes the position
//!   before the exchange would.
//! - `PositionSizer`: fixed-fraction sizing. `notional = equity * fraction
//!   * leverage`, quantity in base units.
//!
//! Stop arithmetic runs in `f64` (the indicator domain); money stays in
//! `Decimal` on the ledger side.

pub mod error;
pub mod sizing;
pub mod trailing;

pub use error::RiskError;
pub use sizing::PositionSizer;
pub use trailing::{StopUpdate, TrailingStop, TrailingStopSettings};
