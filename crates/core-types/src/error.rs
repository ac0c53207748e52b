use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Tick for {symbol} has non-positive price {price}")]
    NonPositivePrice { symbol: String, price: Decimal },

    #[error("Tick for {symbol} has negative volume {volume}")]
    NegativeVolume { symbol: String, volume: Decimal },
}
