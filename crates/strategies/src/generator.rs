use configuration::CoinParams;
use ticks::IndicatorSnapshot;
use tracing::debug;

use crate::error::StrategyError;
use crate::signal::{CloseReason, SignalAction, SignalContext};

/// Volatility-collapse close trigger: hybrid below this fraction of the
/// ATR-like measure.
const VOL_COLLAPSE_RATIO: f64 = 0.1;
/// Band excursion close triggers outside [0.1, 0.9].
const BAND_EXIT_LOW: f64 = 0.1;
const BAND_EXIT_HIGH: f64 = 0.9;

/// The selective two-way signal generator for one symbol.
///
/// Entries fire only when every gate passes: the symbol is tradable, both
/// position slots are empty, the cooldown has elapsed, both volatility
/// measures clear their coin-specific thresholds, price sits in the
/// configured band window, and the combined strength score clears its
/// floor. Exits here are market-regime exits; the per-position trailing
/// stops live elsewhere.
pub struct SignalGenerator {
    params: CoinParams,
}

impl SignalGenerator {
    pub fn new(params: CoinParams) -> Result<Self, StrategyError> {
        params
            .validate()
            .map_err(|e| StrategyError::InvalidParameters(e.to_string()))?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &CoinParams {
        &self.params
    }

    /// Evaluates the latest snapshot. Any indicator the window could not
    /// produce yields `Hold`.
    pub fn evaluate(&self, snapshot: &IndicatorSnapshot, ctx: &SignalContext) -> SignalAction {
        if let Some(entry) = self.check_entry(snapshot, ctx) {
            return entry;
        }
        if let Some(close) = self.check_close(snapshot, ctx) {
            return close;
        }
        SignalAction::Hold
    }

    fn check_entry(&self, snapshot: &IndicatorSnapshot, ctx: &SignalContext) -> Option<SignalAction> {
        if self.params.excluded || ctx.has_position() {
            return None;
        }
        if !self.cooldown_elapsed(ctx) {
            debug!(symbol = %self.params.symbol, "entry suppressed by cooldown");
            return None;
        }

        let hybrid_pct = snapshot.hybrid_pct()?;
        let atr_pct = snapshot.atr_pct()?;
        let bb_position = snapshot.bb_position?;
        let bb_bandwidth = snapshot.bb_bandwidth()?;

        if hybrid_pct < self.params.hybrid_vol_threshold_pct {
            return None;
        }
        if atr_pct < self.params.atr_vol_threshold_pct {
            return None;
        }
        if bb_position < self.params.bb_band_min || bb_position > self.params.bb_band_max {
            return None;
        }
        if let Some(min_momentum) = self.params.min_momentum {
            let momentum = snapshot.momentum?;
            if momentum.abs() < min_momentum {
                return None;
            }
        }

        let strength = self.strength(bb_bandwidth, atr_pct);
        if strength < self.params.entry_strength_min {
            debug!(
                symbol = %self.params.symbol,
                strength,
                floor = self.params.entry_strength_min,
                "entry suppressed by strength"
            );
            return None;
        }

        Some(SignalAction::EntryBoth { strength })
    }

    fn check_close(&self, snapshot: &IndicatorSnapshot, ctx: &SignalContext) -> Option<SignalAction> {
        if !ctx.has_position() {
            return None;
        }
        if let (Some(hybrid), Some(atr)) = (snapshot.hybrid_vol, snapshot.atr_like_vol) {
            if hybrid < VOL_COLLAPSE_RATIO * atr {
                return Some(SignalAction::CloseAll {
                    reason: CloseReason::VolatilityCollapse,
                });
            }
        }
        if let Some(position) = snapshot.bb_position {
            if position < BAND_EXIT_LOW || position > BAND_EXIT_HIGH {
                return Some(SignalAction::CloseAll {
                    reason: CloseReason::BandExcursion,
                });
            }
        }
        None
    }

    fn cooldown_elapsed(&self, ctx: &SignalContext) -> bool {
        match ctx.last_entry_ms {
            Some(last) => ctx.now_ms - last >= (self.params.cooldown_seconds as i64) * 1000,
            None => true,
        }
    }

    /// `0.5 * compression + 0.5 * expansion`, each clamped into [0, 1].
    /// Both thresholds are the coin-specific ones; hard-coded globals here
    /// would silently filter out low-volatility symbols.
    fn strength(&self, bb_bandwidth: f64, atr_pct: f64) -> f64 {
        let threshold = self.params.bb_bandwidth_threshold;
        let compression = ((threshold - bb_bandwidth) / threshold).clamp(0.0, 1.0);
        let expansion = (atr_pct / self.params.atr_vol_threshold_pct).clamp(0.0, 1.0);
        0.5 * compression + 0.5 * expansion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::{CoinParamsEntry, StrategyVariant};
    use rust_decimal_macros::dec;

    fn params(variant: StrategyVariant) -> CoinParams {
        CoinParamsEntry {
            symbol: "ETHUSDT".to_string(),
            excluded: false,
            strategy_variant: variant,
            hybrid_vol_threshold_pct: None,
            atr_vol_threshold_pct: None,
            bb_band_min: None,
            bb_band_max: None,
            cooldown_seconds: None,
            position_size_fraction: dec!(0.1),
            leverage: 10,
            hard_stop_atr_multiplier: 2.0,
            min_loss_floor_pct: 0.01,
            bb_bandwidth_threshold: 0.05,
            entry_strength_min: 0.5,
        }
        .resolve()
        .unwrap()
    }

    /// A snapshot whose volatility figures clear the selective thresholds
    /// with room to spare: hybrid 0.10% of price, atr 0.40%.
    fn entry_snapshot(price: f64) -> IndicatorSnapshot {
        let atr = price * 0.004;
        let hybrid = price * 0.001;
        IndicatorSnapshot {
            timestamp: 0,
            price,
            vwap: Some(price),
            tick_variance_vol: Some(price * 0.0001),
            atr_like_vol: Some(atr),
            hybrid_vol: Some(hybrid),
            bb_middle: Some(price),
            bb_upper: Some(price * 1.0002),
            bb_lower: Some(price * 0.9998),
            bb_position: Some(0.50),
            momentum: Some(2e-4),
        }
    }

    fn idle_ctx(now_ms: i64, last_entry_ms: Option<i64>) -> SignalContext {
        SignalContext {
            now_ms,
            last_entry_ms,
            open_long: false,
            open_short: false,
        }
    }

    fn holding_ctx(now_ms: i64) -> SignalContext {
        SignalContext {
            now_ms,
            last_entry_ms: Some(0),
            open_long: true,
            open_short: true,
        }
    }

    #[test]
    fn all_gates_passing_fires_a_two_way_entry() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let action = generator.evaluate(&entry_snapshot(100.0), &idle_ctx(0, None));
        match action {
            SignalAction::EntryBoth { strength } => assert!(strength >= 0.5),
            other => panic!("expected entry, got {other:?}"),
        }
    }

    #[test]
    fn cooldown_gates_successive_entries() {
        // Same conditions recur at t=100s and t=301s against a 300s
        // cooldown: only the later one is admissible.
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let snapshot = entry_snapshot(100.0);

        let during = generator.evaluate(&snapshot, &idle_ctx(100_000, Some(0)));
        assert_eq!(during, SignalAction::Hold);

        let after = generator.evaluate(&snapshot, &idle_ctx(301_000, Some(0)));
        assert!(matches!(after, SignalAction::EntryBoth { .. }));
    }

    #[test]
    fn excluded_symbols_never_enter() {
        let mut p = params(StrategyVariant::Aggressive);
        p.excluded = true;
        let generator = SignalGenerator::new(p).unwrap();
        assert_eq!(
            generator.evaluate(&entry_snapshot(100.0), &idle_ctx(0, None)),
            SignalAction::Hold
        );
    }

    #[test]
    fn open_positions_block_new_entries() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut ctx = idle_ctx(1_000_000, None);
        ctx.open_long = true;
        // Not even one side may be occupied.
        assert!(!matches!(
            generator.evaluate(&entry_snapshot(100.0), &ctx),
            SignalAction::EntryBoth { .. }
        ));
    }

    #[test]
    fn band_window_is_variant_specific() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.bb_position = Some(0.55); // inside conservative, outside selective
        assert_eq!(generator.evaluate(&snapshot, &idle_ctx(0, None)), SignalAction::Hold);

        let conservative = SignalGenerator::new(params(StrategyVariant::Conservative)).unwrap();
        snapshot.momentum = Some(0.0); // conservative needs no momentum
        assert!(matches!(
            conservative.evaluate(&snapshot, &idle_ctx(0, None)),
            SignalAction::EntryBoth { .. }
        ));
    }

    #[test]
    fn selective_requires_momentum_confirmation() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.momentum = Some(5e-5);
        assert_eq!(generator.evaluate(&snapshot, &idle_ctx(0, None)), SignalAction::Hold);
    }

    #[test]
    fn weak_strength_suppresses_the_entry() {
        // A wide band zeroes the compression term, so strength tops out at
        // 0.5 even with full expansion. A raised floor then rejects the
        // entry on strength alone while every threshold gate still passes.
        let mut strict = params(StrategyVariant::Selective);
        strict.entry_strength_min = 0.75;
        let generator = SignalGenerator::new(strict).unwrap();

        let mut snapshot = entry_snapshot(100.0);
        snapshot.bb_upper = Some(103.0);
        snapshot.bb_lower = Some(97.0); // bandwidth 0.06 > 0.05 threshold
        assert_eq!(generator.evaluate(&snapshot, &idle_ctx(0, None)), SignalAction::Hold);
    }

    #[test]
    fn undefined_indicators_mean_hold() {
        let generator = SignalGenerator::new(params(StrategyVariant::Aggressive)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.bb_position = None;
        assert_eq!(generator.evaluate(&snapshot, &idle_ctx(0, None)), SignalAction::Hold);

        snapshot = entry_snapshot(100.0);
        snapshot.atr_like_vol = None;
        assert_eq!(generator.evaluate(&snapshot, &idle_ctx(0, None)), SignalAction::Hold);
    }

    #[test]
    fn volatility_collapse_closes_everything() {
        // hybrid 0.5 against atr 6.0: well under a tenth.
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.hybrid_vol = Some(0.5);
        snapshot.atr_like_vol = Some(6.0);
        assert_eq!(
            generator.evaluate(&snapshot, &holding_ctx(1_000)),
            SignalAction::CloseAll {
                reason: CloseReason::VolatilityCollapse
            }
        );
    }

    #[test]
    fn band_excursion_closes_everything() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.bb_position = Some(0.95);
        assert_eq!(
            generator.evaluate(&snapshot, &holding_ctx(1_000)),
            SignalAction::CloseAll {
                reason: CloseReason::BandExcursion
            }
        );
    }

    #[test]
    fn close_rules_need_an_open_position() {
        let generator = SignalGenerator::new(params(StrategyVariant::Selective)).unwrap();
        let mut snapshot = entry_snapshot(100.0);
        snapshot.hybrid_vol = Some(0.5);
        snapshot.atr_like_vol = Some(6.0);
        assert_eq!(
            generator.evaluate(&snapshot, &idle_ctx(1_000, None)),
            SignalAction::Hold
        );
    }
}
