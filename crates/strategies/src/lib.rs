//! # Signal Generation
//!
//! This crate contains the selective two-way entry logic. It is a pure
//! logic crate: it has no knowledge of buffers, orders, or the ledger. It
//! consumes an indicator snapshot plus a little per-symbol context and
//! emits one of three actions.
//!
//! ## Architectural Principles
//!
//! - **Variants are data, not types.** The conservative / selective /
//!   aggressive rule sets share one shape; only the threshold bundle (and
//!   the selective momentum confirmation) differ, and those live in
//!   `CoinParams`.
//! - **Undefined inputs mean HOLD.** Any indicator the window could not
//!   produce suppresses the signal instead of erroring.
//! - **Coin-specific thresholds only.** Every gate reads the per-symbol
//!   parameter set; there are no global threshold constants to silently
//!   filter out low-volatility symbols.

pub mod error;
pub mod generator;
pub mod signal;

pub use error::StrategyError;
pub use generator::SignalGenerator;
pub use signal::{CloseReason, SignalAction, SignalContext};
