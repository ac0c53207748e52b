use async_trait::async_trait;
use chrono::DateTime;
use configuration::Simulation;
use core_types::{Fill, OrderIntent, Tick};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::error::OrderError;
use crate::gateway::{is_buy, ExecutionGateway, MarketObserver};

/// How often a resting limit order re-checks the market for a crossing.
const LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The "virtual venue" for paper trading and replay.
///
/// The engine's dispatch path records every tick here before the worker
/// processes it, so an order placed while handling a tick always fills
/// against that contemporaneous price. The gateway never applies slippage
/// itself: the ledger folds it into gross P&L on close, which keeps the
/// charge single and the replay deterministic.
pub struct PaperGateway {
    params: Simulation,
    marks: Mutex<HashMap<String, Mark>>,
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    price: Decimal,
    timestamp_ms: i64,
}

impl MarketObserver for PaperGateway {
    fn record_tick(&self, tick: &Tick) {
        PaperGateway::record_tick(self, tick);
    }
}

impl PaperGateway {
    pub fn new(params: Simulation) -> Self {
        Self {
            params,
            marks: Mutex::new(HashMap::new()),
        }
    }

    /// Records the newest tick for a symbol. Called by the engine before
    /// each tick is processed.
    pub fn record_tick(&self, tick: &Tick) {
        let mut marks = self.marks.lock().expect("mark map poisoned");
        marks.insert(
            tick.symbol.clone(),
            Mark {
                price: tick.price,
                timestamp_ms: tick.timestamp,
            },
        );
    }

    /// Last recorded price per symbol, for marking open positions.
    pub fn marks(&self) -> HashMap<String, Decimal> {
        self.marks
            .lock()
            .expect("mark map poisoned")
            .iter()
            .map(|(symbol, mark)| (symbol.clone(), mark.price))
            .collect()
    }

    fn mark(&self, symbol: &str) -> Result<Mark, OrderError> {
        self.marks
            .lock()
            .expect("mark map poisoned")
            .get(symbol)
            .copied()
            .ok_or_else(|| OrderError::NoMarketData(symbol.to_string()))
    }

    fn fill(&self, intent: &OrderIntent, price: Decimal, timestamp_ms: i64, fee_rate: Decimal) -> Fill {
        Fill {
            intent_id: intent.intent_id,
            symbol: intent.symbol.clone(),
            fill_price: price,
            quantity: intent.quantity,
            timestamp: DateTime::from_timestamp_millis(timestamp_ms)
                .unwrap_or(DateTime::UNIX_EPOCH),
            fee_rate,
        }
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn place_market_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError> {
        if intent.quantity <= Decimal::ZERO {
            return Err(OrderError::Rejected(format!(
                "non-positive quantity {}",
                intent.quantity
            )));
        }
        let mark = self.mark(&intent.symbol)?;
        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            reduce_only = intent.reduce_only,
            price = %mark.price,
            "paper market fill"
        );
        Ok(self.fill(intent, mark.price, mark.timestamp_ms, self.params.taker_fee_pct))
    }

    async fn place_limit_order(&self, intent: &OrderIntent) -> Result<Fill, OrderError> {
        if intent.quantity <= Decimal::ZERO {
            return Err(OrderError::Rejected(format!(
                "non-positive quantity {}",
                intent.quantity
            )));
        }
        let limit_price = intent
            .limit_price
            .ok_or_else(|| OrderError::Rejected("limit order without a price".into()))?;

        let deadline = Duration::from_secs(self.params.limit_order_deadline_secs);
        let buy = is_buy(intent);
        let wait = async {
            loop {
                if let Ok(mark) = self.mark(&intent.symbol) {
                    let crossed = if buy {
                        mark.price <= limit_price
                    } else {
                        mark.price >= limit_price
                    };
                    if crossed {
                        // Resting order: filled at its own price, maker rate.
                        return self.fill(
                            intent,
                            limit_price,
                            mark.timestamp_ms,
                            self.params.maker_fee_pct,
                        );
                    }
                }
                tokio::time::sleep(LIMIT_POLL_INTERVAL).await;
            }
        };

        match tokio::time::timeout(deadline, wait).await {
            Ok(fill) => Ok(fill),
            Err(_) => Err(OrderError::UnfilledTimeout(deadline)),
        }
    }
}
