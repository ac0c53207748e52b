use crate::buffer::TickBuffer;
use core_types::Tick;
use rust_decimal::prelude::ToPrimitive;

/// Bollinger band width in standard deviations of tick-to-tick changes.
const BB_STD_DEV_MULT: f64 = 2.0;
/// Below this fraction of price, the band is considered degenerate and
/// `bb_position` is undefined.
const BAND_DEGENERACY_EPS: f64 = 1e-6;
/// Scale factors that bring the two volatility measures into a comparable
/// range. Design constants, not tunables.
const HYBRID_TICK_VAR_SCALE: f64 = 10.0;
const HYBRID_ATR_SCALE: f64 = 0.2;

fn price_f64(tick: &Tick) -> Option<f64> {
    tick.price.to_f64()
}

/// Volume-weighted average price over the window.
///
/// Falls back to the arithmetic mean when the window carries zero volume;
/// undefined on an empty window.
pub fn vwap(ticks: &[Tick]) -> Option<f64> {
    if ticks.is_empty() {
        return None;
    }
    let mut price_volume = 0.0;
    let mut total_volume = 0.0;
    let mut price_sum = 0.0;
    for tick in ticks {
        let price = price_f64(tick)?;
        let volume = tick.volume.to_f64()?;
        price_volume += price * volume;
        total_volume += volume;
        price_sum += price;
    }
    if total_volume > 0.0 {
        Some(price_volume / total_volume)
    } else {
        Some(price_sum / ticks.len() as f64)
    }
}

/// Sample standard deviation (n-1) of absolute tick-to-tick price changes.
///
/// Needs at least two ticks; a single change has no dispersion and reports
/// zero.
pub fn tick_variance_vol(ticks: &[Tick]) -> Option<f64> {
    if ticks.len() < 2 {
        return None;
    }
    let mut changes = Vec::with_capacity(ticks.len() - 1);
    for pair in ticks.windows(2) {
        let prev = price_f64(&pair[0])?;
        let next = price_f64(&pair[1])?;
        changes.push((next - prev).abs());
    }
    if changes.len() < 2 {
        return Some(0.0);
    }
    let n = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / n;
    let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Mean high-minus-low range over non-overlapping sub-windows of
/// `subwindow` ticks. The candle-free analogue of ATR.
///
/// Needs at least one full sub-window; a trailing partial sub-window is
/// ignored.
pub fn atr_like_vol(ticks: &[Tick], subwindow: usize) -> Option<f64> {
    if subwindow == 0 || ticks.len() < subwindow {
        return None;
    }
    let mut ranges = Vec::with_capacity(ticks.len() / subwindow);
    for chunk in ticks.chunks_exact(subwindow) {
        let mut high = f64::MIN;
        let mut low = f64::MAX;
        for tick in chunk {
            let price = price_f64(tick)?;
            high = high.max(price);
            low = low.min(price);
        }
        ranges.push(high - low);
    }
    Some(ranges.iter().sum::<f64>() / ranges.len() as f64)
}

/// Fractional price change across the window, measured from its earliest
/// tick.
pub fn momentum(ticks: &[Tick]) -> Option<f64> {
    let first = price_f64(ticks.first()?)?;
    let last = price_f64(ticks.last()?)?;
    if ticks.len() < 2 || first <= 0.0 {
        return None;
    }
    Some((last - first) / first)
}

/// All indicators derived from one `(TickBuffer, lookback)` pair.
///
/// Snapshots are ephemeral: nothing here is persisted. Fields that cannot
/// be computed from the available window are absent, and the signal
/// generator treats any absence as HOLD.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    /// Timestamp of the newest tick in the window, ms since epoch.
    pub timestamp: i64,
    /// Price of the newest tick.
    pub price: f64,
    pub vwap: Option<f64>,
    pub tick_variance_vol: Option<f64>,
    pub atr_like_vol: Option<f64>,
    /// `max(tick_variance_vol * 10.0, atr_like_vol * 0.2)`. The max (not
    /// min) form is essential: the min collapses to the tick-variance term
    /// and never triggers entries.
    pub hybrid_vol: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    /// Fractional location of price inside the band; absent when the band
    /// is degenerate (width <= 1e-6 of price).
    pub bb_position: Option<f64>,
    pub momentum: Option<f64>,
}

impl IndicatorSnapshot {
    /// Computes a snapshot over the buffer's `lookback_secs` window.
    ///
    /// Returns `None` when the window is empty (buffer still warming up).
    pub fn compute(buffer: &TickBuffer, lookback_secs: u64, atr_subwindow: usize) -> Option<Self> {
        let window = buffer.since(lookback_secs);
        let newest = window.last()?;
        let price = price_f64(newest)?;

        let vwap = vwap(&window);
        let tick_variance_vol = tick_variance_vol(&window);
        let atr_like_vol = atr_like_vol(&window, atr_subwindow);
        let momentum = momentum(&window);

        let hybrid_vol = match (tick_variance_vol, atr_like_vol) {
            (Some(tv), Some(atr)) => {
                Some((tv * HYBRID_TICK_VAR_SCALE).max(atr * HYBRID_ATR_SCALE))
            }
            _ => None,
        };

        let (bb_middle, bb_upper, bb_lower) = match (vwap, tick_variance_vol) {
            (Some(mid), Some(tv)) => (
                Some(mid),
                Some(mid + BB_STD_DEV_MULT * tv),
                Some(mid - BB_STD_DEV_MULT * tv),
            ),
            _ => (None, None, None),
        };

        let bb_position = match (bb_upper, bb_lower) {
            (Some(upper), Some(lower)) if upper - lower > BAND_DEGENERACY_EPS * price => {
                Some((price - lower) / (upper - lower))
            }
            _ => None,
        };

        Some(Self {
            timestamp: newest.timestamp,
            price,
            vwap,
            tick_variance_vol,
            atr_like_vol,
            hybrid_vol,
            bb_middle,
            bb_upper,
            bb_lower,
            bb_position,
            momentum,
        })
    }

    /// ATR-like volatility as a fraction of price.
    pub fn atr_pct(&self) -> Option<f64> {
        self.atr_like_vol.map(|atr| atr / self.price)
    }

    /// Hybrid volatility as a fraction of price.
    pub fn hybrid_pct(&self) -> Option<f64> {
        self.hybrid_vol.map(|h| h / self.price)
    }

    /// Band width relative to the middle band.
    pub fn bb_bandwidth(&self) -> Option<f64> {
        match (self.bb_upper, self.bb_lower, self.bb_middle) {
            (Some(upper), Some(lower), Some(mid)) if mid > 0.0 => Some((upper - lower) / mid),
            _ => None,
        }
    }
}
