use async_trait::async_trait;
use core_types::{Fill, OrderIntent, Side, Tick};

use crate::error::OrderError;

/// A generic order-submission sink.
///
/// The engine is agnostic about whether it is talking to a paper
/// simulation or a real venue; either way the gateway is the sole
/// authority on fill price and fee rate.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submits a market order and returns the fill receipt.
    async fn place_market_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError>;

    /// Submits a limit order. The order fills when the market crosses the
    /// limit price; if it does not within a bounded wait, the order is
    /// cancelled and `UnfilledTimeout` returned.
    async fn place_limit_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError>;
}

/// A sink for market data the execution layer needs to price paper fills.
///
/// The engine's dispatch path records every tick here before the worker
/// processes it; a live venue gateway would simply ignore the feed.
pub trait MarketObserver: Send + Sync {
    fn record_tick(&self, tick: &Tick);
}

/// Whether the intent buys base asset at the venue: opening a Long or
/// closing a Short buys; the other two sell.
pub fn is_buy(intent: &OrderIntent) -> bool {
    match (intent.side, intent.reduce_only) {
        (Side::Long, false) | (Side::Short, true) => true,
        (Side::Long, true) | (Side::Short, false) => false,
    }
}
