use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read the tick recording: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed tick record at line {line}: {source}")]
    MalformedTick {
        line: usize,
        source: serde_json::Error,
    },

    #[error("Engine error during replay: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Ledger error during replay: {0}")]
    Ledger(#[from] ledger::LedgerError),

    #[error("Progress bar template error: {0}")]
    Template(#[from] indicatif::style::TemplateError),
}
