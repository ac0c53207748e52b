//! # Position Ledger
//!
//! The single owner of account state: equity, open positions, the
//! closed-trade log, per-symbol aggregates, and the fee accumulator.
//!
//! ## Architectural Principles
//!
//! - **One writer at a time.** The engine shares the ledger behind a
//!   `tokio::sync::Mutex`; every mutation happens in a short critical
//!   section and readers get immutable snapshots.
//! - **Net figures only.** All reported returns, win rates, and drawdowns
//!   derive from `net_pnl`; gross figures with fees omitted never leave
//!   this crate.
//! - **Two persisted artifacts.** The append-only closed-trade log and the
//!   overwrite-on-change open-position snapshot; nothing else leaves the
//!   process.

pub mod account;
pub mod error;
pub mod persistence;
pub mod report;

pub use account::{Ledger, SymbolStats};
pub use error::LedgerError;
pub use persistence::LedgerPersistence;
pub use report::PerformanceSnapshot;
