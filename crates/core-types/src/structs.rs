use crate::enums::{ExitReason, OrderType, Side};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single trade print from the exchange; the atomic unit of market data.
///
/// Within one symbol's stream, `timestamp` is monotonically non-decreasing.
/// The tick source may replay a tick across a reconnect boundary, so equal
/// timestamps are possible and the engine deduplicates on
/// (symbol, timestamp, price, volume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub price: Decimal,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_buyer_maker: Option<bool>,
}

impl Tick {
    /// Builds a tick from exchange-reported fields, rejecting prints the
    /// venue should never emit: price must be strictly positive and
    /// volume non-negative.
    pub fn new(
        symbol: String,
        timestamp: i64,
        price: Decimal,
        volume: Decimal,
        is_buyer_maker: Option<bool>,
    ) -> Result<Self, CoreError> {
        if price <= Decimal::ZERO {
            return Err(CoreError::NonPositivePrice { symbol, price });
        }
        if volume < Decimal::ZERO {
            return Err(CoreError::NegativeVolume { symbol, volume });
        }
        Ok(Self {
            symbol,
            timestamp,
            price,
            volume,
            is_buyer_maker,
        })
    }

    /// The identity used to drop duplicated ticks at a reconnect boundary.
    pub fn dedup_key(&self) -> (i64, Decimal, Decimal) {
        (self.timestamp, self.price, self.volume)
    }

    pub fn time(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// An open position on a single symbol and side.
///
/// `current_stop_price` only ever ratchets toward the price: it is
/// monotonically non-decreasing for Long and non-increasing for Short over
/// the position's lifetime. A position is closed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub leverage: u32,
    /// Max price seen since entry for Long, min for Short.
    pub extreme_favorable_price: Decimal,
    pub current_stop_price: Decimal,
    pub opened_by_signal_id: Uuid,
}

/// A closed trade, appended to the trade log on close.
///
/// `net_pnl = gross_pnl - fees_paid`; slippage is folded into `gross_pnl`
/// and reported separately as `slippage_cost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Decimal,
    pub exit_time: DateTime<Utc>,
    pub quantity: Decimal,
    pub leverage: u32,
    pub exit_reason: ExitReason,
    pub gross_pnl: Decimal,
    pub fees_paid: Decimal,
    pub slippage_cost: Decimal,
    pub net_pnl: Decimal,
}

/// An order intent handed to the execution gateway.
///
/// Intents carry only what the gateway needs: symbol, side of the *order*
/// (expressed as the position side being opened or reduced plus a reduce
/// flag), quantity, and an optional limit price. The gateway is the sole
/// authority on fill price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub intent_id: Uuid,
    pub symbol: String,
    pub side: Side,
    /// True when this order closes or reduces an existing position.
    pub reduce_only: bool,
    pub quantity: Decimal,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
}

impl OrderIntent {
    pub fn market(symbol: &str, side: Side, quantity: Decimal, reduce_only: bool) -> Self {
        Self {
            intent_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            reduce_only,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    pub fn limit(symbol: &str, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            intent_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side,
            reduce_only: false,
            quantity,
            order_type: OrderType::Limit,
            limit_price: Some(price),
        }
    }
}

/// The receipt returned by the execution gateway for a filled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub intent_id: Uuid,
    pub symbol: String,
    pub fill_price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    /// The fee rate the venue charged for this fill (taker or maker).
    pub fee_rate: Decimal,
}
