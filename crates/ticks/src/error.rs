use thiserror::Error;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Out-of-order tick for {symbol}: got {got} ms after {last} ms")]
    OutOfOrder { symbol: String, got: i64, last: i64 },
}
