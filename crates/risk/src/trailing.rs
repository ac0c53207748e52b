use core_types::{ExitReason, Side};
use tracing::debug;

use crate::error::RiskError;

/// Regime-banded base ATR multipliers for the trailing distance.
const REGIME_HIGH_ATR_PCT: f64 = 0.03;
const REGIME_LOW_ATR_PCT: f64 = 0.01;
const REGIME_HIGH_MULT: f64 = 2.2;
const REGIME_MID_MULT: f64 = 1.8;
const REGIME_LOW_MULT: f64 = 1.5;

/// Profit fraction above which the trail starts tightening.
const MIN_PROFIT_THRESHOLD: f64 = 0.005;
/// How aggressively excess profit shrinks the trail distance.
const ACCELERATION_STEP: f64 = 0.3;
const PROFIT_TIGHTEN_SCALE: f64 = 10.0;
/// The tightened trail never drops below 1.0 ATR.
const TRAIL_FLOOR_MULT: f64 = 1.0;
/// Above this profit fraction an extra 0.5 ATR is shaved off,
/// floored at 0.8 ATR.
const EXTRA_TIGHTEN_PROFIT: f64 = 0.02;
const EXTRA_TIGHTEN_MULT: f64 = 0.5;
const EXTRA_TIGHTEN_FLOOR_MULT: f64 = 0.8;

/// The liquidation guard fires when the adverse move reaches this fraction
/// of the full 1/leverage wipe-out distance.
const LIQUIDATION_GUARD_FRACTION: f64 = 0.9;

/// Per-position stop parameters, taken from the symbol's `CoinParams`.
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopSettings {
    pub hard_stop_atr_multiplier: f64,
    pub min_loss_floor_pct: f64,
    pub leverage: u32,
}

/// The outcome of one stop evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopUpdate {
    /// The stop after this tick. Monotone over the position's lifetime.
    pub stop_price: f64,
    /// When set, the position must be closed at `exit_price` with the
    /// given reason.
    pub triggered: Option<ExitReason>,
    /// The price the close should be recorded at when triggered.
    pub exit_price: f64,
}

/// The adaptive trailing stop for one open position.
///
/// Construction *is* initialization: the initial stop sits at the
/// hard-stop distance from entry, computed from the ATR snapshot taken
/// when the position opened. There is no way to evaluate an uninitialized
/// stop.
#[derive(Debug, Clone)]
pub struct TrailingStop {
    side: Side,
    entry_price: f64,
    extreme: f64,
    current_stop: f64,
    settings: TrailingStopSettings,
}

impl TrailingStop {
    /// Initializes the stop for a freshly opened position.
    pub fn initialize(
        side: Side,
        entry_price: f64,
        initial_atr_pct: f64,
        settings: TrailingStopSettings,
    ) -> Result<Self, RiskError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(RiskError::InvalidPrice(entry_price));
        }
        if !initial_atr_pct.is_finite() || initial_atr_pct < 0.0 {
            return Err(RiskError::InvalidParameters(format!(
                "initial atr_pct {initial_atr_pct} is not usable"
            )));
        }
        if settings.hard_stop_atr_multiplier < 1.0 {
            return Err(RiskError::InvalidParameters(
                "hard_stop_atr_multiplier must be >= 1.0".into(),
            ));
        }
        if settings.min_loss_floor_pct <= 0.0 {
            return Err(RiskError::InvalidParameters(
                "min_loss_floor_pct must be > 0".into(),
            ));
        }

        let hard_distance = Self::hard_stop_distance(initial_atr_pct, &settings);
        let current_stop = match side {
            Side::Long => entry_price * (1.0 - hard_distance),
            Side::Short => entry_price * (1.0 + hard_distance),
        };
        Ok(Self {
            side,
            entry_price,
            extreme: entry_price,
            current_stop,
            settings,
        })
    }

    /// Rebuilds a stop from a persisted open position after restart.
    pub fn resume(
        side: Side,
        entry_price: f64,
        extreme: f64,
        current_stop: f64,
        settings: TrailingStopSettings,
    ) -> Result<Self, RiskError> {
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(RiskError::InvalidPrice(entry_price));
        }
        Ok(Self {
            side,
            entry_price,
            extreme,
            current_stop,
            settings,
        })
    }

    pub fn current_stop(&self) -> f64 {
        self.current_stop
    }

    pub fn extreme(&self) -> f64 {
        self.extreme
    }

    /// Whether the liquidation guard alone would close at this price. Used
    /// when no usable ATR snapshot exists yet (e.g. right after resume)
    /// and the full stop evaluation must wait for warm-up.
    pub fn guard_triggered(&self, price: f64) -> bool {
        if !price.is_finite() || price <= 0.0 {
            return false;
        }
        let adverse = match self.side {
            Side::Long => (self.entry_price - price) / self.entry_price,
            Side::Short => (price - self.entry_price) / self.entry_price,
        };
        adverse >= LIQUIDATION_GUARD_FRACTION / self.settings.leverage.max(1) as f64
    }

    /// Evaluates the stop against a new tick.
    ///
    /// The liquidation guard is checked first; then the extreme and the
    /// trailing/hard-stop combination are updated and the trigger
    /// condition tested. The returned stop price never loosens.
    pub fn update(&mut self, price: f64, atr_pct: f64) -> Result<StopUpdate, RiskError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(RiskError::InvalidPrice(price));
        }
        let atr_pct = if atr_pct.is_finite() && atr_pct >= 0.0 {
            atr_pct
        } else {
            0.0
        };

        // Liquidation guard: close before the venue would.
        let adverse = match self.side {
            Side::Long => (self.entry_price - price) / self.entry_price,
            Side::Short => (price - self.entry_price) / self.entry_price,
        };
        let guard_distance = LIQUIDATION_GUARD_FRACTION / self.settings.leverage.max(1) as f64;
        if adverse >= guard_distance {
            return Ok(StopUpdate {
                stop_price: self.current_stop,
                triggered: Some(ExitReason::LiquidationGuard),
                exit_price: price,
            });
        }

        // Track the favorable extreme.
        self.extreme = match self.side {
            Side::Long => self.extreme.max(price),
            Side::Short => self.extreme.min(price),
        };

        let trail_distance = self.trail_distance(atr_pct);
        let hard_distance = Self::hard_stop_distance(atr_pct, &self.settings);

        let (candidate_trailing, hard_stop_price) = match self.side {
            Side::Long => (
                self.extreme * (1.0 - trail_distance),
                self.entry_price * (1.0 - hard_distance),
            ),
            Side::Short => (
                self.extreme * (1.0 + trail_distance),
                self.entry_price * (1.0 + hard_distance),
            ),
        };

        // Ratchet: the stop takes the tightest of itself, the trailing
        // candidate, and the hard-stop floor, and never moves back.
        let previous = self.current_stop;
        let new_stop = match self.side {
            Side::Long => previous.max(candidate_trailing).max(hard_stop_price),
            Side::Short => previous.min(candidate_trailing).min(hard_stop_price),
        };
        let widened = match self.side {
            Side::Long => new_stop < previous,
            Side::Short => new_stop > previous,
        };
        if widened {
            return Err(RiskError::StopMonotonicityViolated {
                side: self.side.to_string(),
                from: previous,
                to: new_stop,
            });
        }
        self.current_stop = new_stop;

        let hit = match self.side {
            Side::Long => price <= new_stop,
            Side::Short => price >= new_stop,
        };
        let triggered = if hit {
            // Classify by which bound is the operative one.
            let trailing_active = match self.side {
                Side::Long => candidate_trailing >= hard_stop_price,
                Side::Short => candidate_trailing <= hard_stop_price,
            };
            Some(if trailing_active {
                ExitReason::TrailingStop
            } else {
                ExitReason::HardStop
            })
        } else {
            None
        };

        if triggered.is_some() {
            debug!(
                side = %self.side,
                price,
                stop = new_stop,
                extreme = self.extreme,
                "stop triggered"
            );
        }

        Ok(StopUpdate {
            stop_price: new_stop,
            triggered,
            exit_price: new_stop,
        })
    }

    /// `max(min_loss_floor, atr_pct * multiplier)`: a fixed 1% cap is too
    /// tight on high-volatility symbols and exits prematurely.
    fn hard_stop_distance(atr_pct: f64, settings: &TrailingStopSettings) -> f64 {
        settings
            .min_loss_floor_pct
            .max(atr_pct * settings.hard_stop_atr_multiplier)
    }

    /// The ATR-scaled trailing distance for the current profit state.
    fn trail_distance(&self, atr_pct: f64) -> f64 {
        let base_multiplier = if atr_pct > REGIME_HIGH_ATR_PCT {
            REGIME_HIGH_MULT
        } else if atr_pct > REGIME_LOW_ATR_PCT {
            REGIME_MID_MULT
        } else {
            REGIME_LOW_MULT
        };
        let mut distance = base_multiplier * atr_pct;

        let profit = match self.side {
            Side::Long => (self.extreme - self.entry_price) / self.entry_price,
            Side::Short => (self.entry_price - self.extreme) / self.entry_price,
        };
        if profit > MIN_PROFIT_THRESHOLD {
            let tightened = distance
                - PROFIT_TIGHTEN_SCALE
                    * (profit - MIN_PROFIT_THRESHOLD)
                    * ACCELERATION_STEP
                    * atr_pct;
            distance = tightened.max(TRAIL_FLOOR_MULT * atr_pct);
            if profit > EXTRA_TIGHTEN_PROFIT {
                distance =
                    (distance - EXTRA_TIGHTEN_MULT * atr_pct).max(EXTRA_TIGHTEN_FLOOR_MULT * atr_pct);
            }
        }
        distance
    }
}
