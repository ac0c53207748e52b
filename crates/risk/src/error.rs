use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Risk parameters are invalid: {0}")]
    InvalidParameters(String),

    #[error("Invalid price fed to stop evaluation: {0}")]
    InvalidPrice(f64),

    #[error("Stop for {side} position moved the wrong way: {from} -> {to}")]
    StopMonotonicityViolated { side: String, from: f64, to: f64 },

    #[error("Insufficient equity ({0}) to size a position")]
    InsufficientEquity(rust_decimal::Decimal),

    #[error("A sizing calculation error occurred: {0}")]
    Calculation(String),
}
