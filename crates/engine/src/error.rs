use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger::LedgerError),

    /// A symbol worker detected a broken invariant (stop moved the wrong
    /// way, duplicate same-side position). Fatal for that symbol only.
    #[error("Invariant violation on {symbol}: {detail}")]
    InvariantViolation { symbol: String, detail: String },
}
