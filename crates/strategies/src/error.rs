use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Signal generator received invalid parameters: {0}")]
    InvalidParameters(String),
}
