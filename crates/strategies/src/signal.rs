/// Why the generator asked for every position on the symbol to be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Hybrid volatility fell below a tenth of the ATR-like measure.
    VolatilityCollapse,
    /// Price left the usable middle of the band (below 0.1 or above 0.9).
    BandExcursion,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::VolatilityCollapse => write!(f, "volatility collapse"),
            CloseReason::BandExcursion => write!(f, "extreme band excursion"),
        }
    }
}

/// The output of one generator evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalAction {
    /// Do nothing.
    Hold,
    /// Open one LONG and one SHORT simultaneously.
    EntryBoth { strength: f64 },
    /// Close every open position for the symbol at market, bypassing the
    /// trailing stops.
    CloseAll { reason: CloseReason },
}

/// The per-symbol context the generator needs beyond the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext {
    /// Timestamp of the tick being processed, ms since epoch.
    pub now_ms: i64,
    /// When the last two-way entry (or signal close) happened, if any.
    pub last_entry_ms: Option<i64>,
    pub open_long: bool,
    pub open_short: bool,
}

impl SignalContext {
    pub fn has_position(&self) -> bool {
        self.open_long || self.open_short
    }
}
