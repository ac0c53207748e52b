use core_types::Side;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Two same-side positions on one symbol would violate the ledger
    /// invariant; the affected symbol worker treats this as fatal.
    #[error("A {side} position is already open on {symbol}")]
    DuplicateSide { symbol: String, side: Side },

    #[error("No open {side} position on {symbol}")]
    PositionNotFound { symbol: String, side: Side },

    #[error("Ledger persistence I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Invalid ledger state: {0}")]
    InvalidState(String),
}
