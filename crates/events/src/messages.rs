use chrono::{DateTime, Utc};
use core_types::{ClosedTrade, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EventsError;

/// The top-level engine event enum.
///
/// `#[serde(tag = "type", content = "payload")]` keeps the serialized form
/// a flat, self-describing object for any attached consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// A two-way entry opened this position (one event per leg).
    PositionOpened(Position),
    /// A position closed; the trade has been appended to the log.
    TradeClosed(ClosedTrade),
    /// An entry signal fired but could not be completed; both legs were
    /// reverted.
    EntryAborted { symbol: String, detail: String },
    /// Account equity after a close.
    EquityUpdated {
        timestamp: DateTime<Utc>,
        account_equity: Decimal,
    },
    /// A symbol worker hit a fatal invariant violation and exited; the
    /// rest of the engine keeps running.
    WorkerFailed { symbol: String, detail: String },
}

impl EngineEvent {
    /// One machine-readable line per event, for log relays and any other
    /// attached consumer.
    pub fn to_json(&self) -> Result<String, EventsError> {
        serde_json::to_string(self).map_err(|e| EventsError::Serialization(e.to_string()))
    }
}
