use core_types::Tick;
use futures_util::stream::StreamExt;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::broadcast;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::FeedError;

/// Seconds to wait before re-dialling a dropped connection.
const RECONNECT_DELAY_SECS: u64 = 5;

// --- WebSocket Deserialization Structs ---
#[derive(Debug, Deserialize)]
struct WsStreamWrapper {
    #[allow(dead_code)]
    stream: String,
    data: WsAggTrade,
}

#[derive(Debug, Deserialize)]
struct WsAggTrade {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "T")]
    trade_time: i64,
    #[serde(rename = "p")]
    price: String,
    #[serde(rename = "q")]
    quantity: String,
    #[serde(rename = "m")]
    is_buyer_maker: bool,
}

/// Connects to the futures aggTrade combined stream and fans ticks out
/// per symbol.
pub struct TickFeed {
    base_url: Url,
}

impl TickFeed {
    /// `testnet` selects the exchange's test environment; both carry only
    /// public market data.
    pub fn new(testnet: bool) -> Self {
        let base_url = if testnet {
            "wss://stream.binancefuture.com"
        } else {
            "wss://fstream.binance.com"
        };
        Self {
            base_url: Url::parse(base_url).expect("static WebSocket base URL parses"),
        }
    }

    /// Subscribes to every symbol's aggTrade stream and returns one
    /// broadcast receiver per symbol.
    ///
    /// The channels are lossy: a consumer that falls behind loses the
    /// oldest buffered ticks (and is told how many), never the newest.
    /// A background task owns the connection and reconnects
    /// forever; it exits when every receiver is gone.
    pub fn subscribe(
        &self,
        symbols: &[String],
        channel_capacity: usize,
    ) -> Result<HashMap<String, broadcast::Receiver<Tick>>, FeedError> {
        if symbols.is_empty() {
            return Err(FeedError::NoSymbols);
        }

        let mut senders: HashMap<String, broadcast::Sender<Tick>> = HashMap::new();
        let mut receivers = HashMap::new();
        for symbol in symbols {
            let (tx, rx) = broadcast::channel(channel_capacity.max(1));
            senders.insert(symbol.to_uppercase(), tx);
            receivers.insert(symbol.clone(), rx);
        }

        let streams = symbols
            .iter()
            .map(|s| format!("{}@aggTrade", s.to_lowercase()))
            .collect::<Vec<_>>()
            .join("/");
        let mut url = self.base_url.clone();
        url.set_path("/stream");
        url.set_query(Some(&format!("streams={streams}")));
        debug!(%url, "tick stream URL");

        tokio::spawn(async move {
            loop {
                info!("connecting to tick stream...");
                match connect_async(url.as_str()).await {
                    Ok((mut stream, _)) => {
                        info!("tick stream connected");
                        while let Some(message) = stream.next().await {
                            match message {
                                Ok(Message::Text(text)) => {
                                    match serde_json::from_str::<WsStreamWrapper>(&text) {
                                        Ok(wrapper) if wrapper.data.event_type == "aggTrade" => {
                                            match parse_tick(&wrapper.data) {
                                                Some(tick) => {
                                                    if let Some(tx) = senders.get(&tick.symbol) {
                                                        // A send error only means every
                                                        // receiver is gone.
                                                        if tx.send(tick).is_err()
                                                            && senders
                                                                .values()
                                                                .all(|s| s.receiver_count() == 0)
                                                        {
                                                            info!("all tick consumers dropped; feed exiting");
                                                            return;
                                                        }
                                                    }
                                                }
                                                None => {
                                                    warn!(symbol = %wrapper.data.symbol, "unparseable aggTrade frame");
                                                }
                                            }
                                        }
                                        Ok(_) => {} // other event types are silently skipped
                                        Err(e) => {
                                            warn!(error = %e, "failed to parse stream frame");
                                        }
                                    }
                                }
                                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                                Ok(Message::Close(frame)) => {
                                    info!(?frame, "tick stream closed by peer");
                                    break;
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    error!(error = %e, "tick stream message error");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "tick stream connection error");
                    }
                }
                warn!(
                    delay_secs = RECONNECT_DELAY_SECS,
                    "tick stream disconnected; reconnecting"
                );
                tokio::time::sleep(tokio::time::Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        });

        Ok(receivers)
    }
}

fn parse_tick(raw: &WsAggTrade) -> Option<Tick> {
    let price = Decimal::from_str(&raw.price).ok()?;
    let volume = Decimal::from_str(&raw.quantity).ok()?;
    match Tick::new(
        raw.symbol.clone(),
        raw.trade_time,
        price,
        volume,
        Some(raw.is_buyer_maker),
    ) {
        Ok(tick) => Some(tick),
        Err(e) => {
            warn!(error = %e, "exchange sent an invalid trade print");
            None
        }
    }
}
