use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderError {
    /// Network or rate-limit trouble; worth retrying within the deadline.
    #[error("Transient gateway error: {0}")]
    Transient(String),

    /// The venue refused the order (bad price, insufficient balance).
    /// Never retried.
    #[error("Order rejected: {0}")]
    Rejected(String),

    /// A limit order did not fill within its bounded wait.
    #[error("Limit order unfilled within {0:?}")]
    UnfilledTimeout(Duration),

    /// The per-order deadline elapsed before any response.
    #[error("Order placement timed out after {0:?}")]
    Timeout(Duration),

    /// Transient failures persisted through every retry attempt.
    #[error("Order retries exhausted: {0}")]
    Exhausted(String),

    /// The paper gateway has seen no tick for the symbol yet.
    #[error("No market data recorded for {0}")]
    NoMarketData(String),
}

impl OrderError {
    /// Only transient failures are eligible for another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::Transient(_))
    }
}
