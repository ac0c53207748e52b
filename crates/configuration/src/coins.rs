use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::ConfigError;

/// The rule-shape presets. Variant-specific numbers live in data; the
/// variant tag only switches threshold bundles (plus the momentum
/// confirmation required by `Selective`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyVariant {
    Conservative,
    Selective,
    Aggressive,
}

impl StrategyVariant {
    fn preset(&self) -> VariantPreset {
        match self {
            StrategyVariant::Conservative => VariantPreset {
                hybrid_vol_threshold_pct: 0.0004,
                atr_vol_threshold_pct: 0.0015,
                bb_band_min: 0.40,
                bb_band_max: 0.60,
                cooldown_secs: 300,
                min_momentum: None,
            },
            StrategyVariant::Selective => VariantPreset {
                hybrid_vol_threshold_pct: 0.0008,
                atr_vol_threshold_pct: 0.0030,
                bb_band_min: 0.48,
                bb_band_max: 0.52,
                cooldown_secs: 300,
                min_momentum: Some(1e-4),
            },
            StrategyVariant::Aggressive => VariantPreset {
                hybrid_vol_threshold_pct: 0.0002,
                atr_vol_threshold_pct: 0.0010,
                bb_band_min: 0.35,
                bb_band_max: 0.65,
                cooldown_secs: 180,
                min_momentum: None,
            },
        }
    }
}

struct VariantPreset {
    hybrid_vol_threshold_pct: f64,
    atr_vol_threshold_pct: f64,
    bb_band_min: f64,
    bb_band_max: f64,
    cooldown_secs: u64,
    min_momentum: Option<f64>,
}

/// One symbol's entry in the coin-parameter file. Threshold fields are
/// optional overrides; anything left out falls back to the variant preset.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinParamsEntry {
    pub symbol: String,
    #[serde(default)]
    pub excluded: bool,
    pub strategy_variant: StrategyVariant,
    pub hybrid_vol_threshold_pct: Option<f64>,
    pub atr_vol_threshold_pct: Option<f64>,
    pub bb_band_min: Option<f64>,
    pub bb_band_max: Option<f64>,
    pub cooldown_seconds: Option<u64>,
    #[serde(default = "default_position_size_fraction")]
    pub position_size_fraction: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    #[serde(default = "default_hard_stop_atr_multiplier")]
    pub hard_stop_atr_multiplier: f64,
    #[serde(default = "default_min_loss_floor_pct")]
    pub min_loss_floor_pct: f64,
    #[serde(default = "default_bb_bandwidth_threshold")]
    pub bb_bandwidth_threshold: f64,
    #[serde(default = "default_entry_strength_min")]
    pub entry_strength_min: f64,
}

fn default_position_size_fraction() -> Decimal {
    dec!(0.1)
}
fn default_leverage() -> u32 {
    10
}
fn default_hard_stop_atr_multiplier() -> f64 {
    2.0
}
fn default_min_loss_floor_pct() -> f64 {
    0.01
}
fn default_bb_bandwidth_threshold() -> f64 {
    0.05
}
fn default_entry_strength_min() -> f64 {
    0.5
}

/// The coin-parameter file: a collection of per-symbol entries.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinParamsFile {
    #[serde(rename = "coin")]
    pub coins: Vec<CoinParamsEntry>,
}

/// A fully-resolved per-symbol parameter set, read-only after startup.
#[derive(Debug, Clone)]
pub struct CoinParams {
    pub symbol: String,
    pub excluded: bool,
    pub strategy_variant: StrategyVariant,
    pub hybrid_vol_threshold_pct: f64,
    pub atr_vol_threshold_pct: f64,
    pub bb_band_min: f64,
    pub bb_band_max: f64,
    pub bb_bandwidth_threshold: f64,
    /// Momentum confirmation floor; `None` disables the check.
    pub min_momentum: Option<f64>,
    pub entry_strength_min: f64,
    pub cooldown_seconds: u64,
    pub position_size_fraction: Decimal,
    pub leverage: u32,
    pub hard_stop_atr_multiplier: f64,
    pub min_loss_floor_pct: f64,
}

impl CoinParamsEntry {
    /// Fills unset fields from the variant preset and checks the load-time
    /// invariants. Violations are fatal configuration errors.
    pub fn resolve(&self) -> Result<CoinParams, ConfigError> {
        let preset = self.strategy_variant.preset();
        let params = CoinParams {
            symbol: self.symbol.clone(),
            excluded: self.excluded,
            strategy_variant: self.strategy_variant,
            hybrid_vol_threshold_pct: self
                .hybrid_vol_threshold_pct
                .unwrap_or(preset.hybrid_vol_threshold_pct),
            atr_vol_threshold_pct: self
                .atr_vol_threshold_pct
                .unwrap_or(preset.atr_vol_threshold_pct),
            bb_band_min: self.bb_band_min.unwrap_or(preset.bb_band_min),
            bb_band_max: self.bb_band_max.unwrap_or(preset.bb_band_max),
            bb_bandwidth_threshold: self.bb_bandwidth_threshold,
            min_momentum: preset.min_momentum,
            entry_strength_min: self.entry_strength_min,
            cooldown_seconds: self.cooldown_seconds.unwrap_or(preset.cooldown_secs),
            position_size_fraction: self.position_size_fraction,
            leverage: self.leverage,
            hard_stop_atr_multiplier: self.hard_stop_atr_multiplier,
            min_loss_floor_pct: self.min_loss_floor_pct,
        };
        params.validate()?;
        Ok(params)
    }
}

impl CoinParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.symbol.trim().is_empty() {
            return fail("coin entry with empty symbol".into());
        }
        if !(self.bb_band_min < self.bb_band_max) {
            return fail(format!(
                "{}: bb_band_min ({}) must be < bb_band_max ({})",
                self.symbol, self.bb_band_min, self.bb_band_max
            ));
        }
        if !(0.0..=1.0).contains(&self.bb_band_min) || !(0.0..=1.0).contains(&self.bb_band_max) {
            return fail(format!("{}: bb band window must lie in [0, 1]", self.symbol));
        }
        if self.hybrid_vol_threshold_pct <= 0.0 || self.atr_vol_threshold_pct <= 0.0 {
            return fail(format!("{}: volatility thresholds must be positive", self.symbol));
        }
        if self.bb_bandwidth_threshold <= 0.0 {
            return fail(format!("{}: bb_bandwidth_threshold must be positive", self.symbol));
        }
        if self.position_size_fraction <= Decimal::ZERO || self.position_size_fraction > Decimal::ONE {
            return fail(format!(
                "{}: position_size_fraction must be in (0, 1]",
                self.symbol
            ));
        }
        if self.leverage < 1 {
            return fail(format!("{}: leverage must be >= 1", self.symbol));
        }
        if self.hard_stop_atr_multiplier < 1.0 {
            return fail(format!(
                "{}: hard_stop_atr_multiplier must be >= 1.0",
                self.symbol
            ));
        }
        if self.min_loss_floor_pct <= 0.0 {
            return fail(format!("{}: min_loss_floor_pct must be > 0", self.symbol));
        }
        Ok(())
    }
}

/// Resolves every entry and indexes the result by symbol, enforcing symbol
/// uniqueness across the file.
pub fn resolve_coin_params(file: &CoinParamsFile) -> Result<HashMap<String, CoinParams>, ConfigError> {
    let mut by_symbol = HashMap::with_capacity(file.coins.len());
    for entry in &file.coins {
        let params = entry.resolve()?;
        if by_symbol.insert(params.symbol.clone(), params).is_some() {
            return Err(ConfigError::ValidationError(format!(
                "duplicate coin entry for symbol {}",
                entry.symbol
            )));
        }
    }
    if by_symbol.is_empty() {
        return Err(ConfigError::ValidationError(
            "coin-parameter file contains no coins".into(),
        ));
    }
    Ok(by_symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, variant: StrategyVariant) -> CoinParamsEntry {
        CoinParamsEntry {
            symbol: symbol.to_string(),
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
    }

    #[test]
    fn selective_preset_requires_momentum_confirmation() {
        let params = entry("ETHUSDT", StrategyVariant::Selective).resolve().unwrap();
        assert_eq!(params.hybrid_vol_threshold_pct, 0.0008);
        assert_eq!(params.atr_vol_threshold_pct, 0.0030);
        assert_eq!(params.bb_band_min, 0.48);
        assert_eq!(params.bb_band_max, 0.52);
        assert_eq!(params.min_momentum, Some(1e-4));
        assert_eq!(params.cooldown_seconds, 300);
    }

    #[test]
    fn aggressive_preset_has_shorter_cooldown() {
        let params = entry("SOLUSDT", StrategyVariant::Aggressive).resolve().unwrap();
        assert_eq!(params.cooldown_seconds, 180);
        assert_eq!(params.min_momentum, None);
    }

    #[test]
    fn explicit_thresholds_override_the_preset() {
        let mut e = entry("XRPUSDT", StrategyVariant::Conservative);
        e.hybrid_vol_threshold_pct = Some(0.001);
        e.cooldown_seconds = Some(60);
        let params = e.resolve().unwrap();
        assert_eq!(params.hybrid_vol_threshold_pct, 0.001);
        assert_eq!(params.cooldown_seconds, 60);
        // Untouched fields still come from the preset.
        assert_eq!(params.atr_vol_threshold_pct, 0.0015);
    }

    #[test]
    fn inverted_band_window_is_rejected() {
        let mut e = entry("DOGEUSDT", StrategyVariant::Conservative);
        e.bb_band_min = Some(0.7);
        e.bb_band_max = Some(0.3);
        assert!(e.resolve().is_err());
    }

    #[test]
    fn loose_hard_stop_multiplier_is_rejected() {
        let mut e = entry("BNBUSDT", StrategyVariant::Conservative);
        e.hard_stop_atr_multiplier = 0.5;
        assert!(e.resolve().is_err());
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let file = CoinParamsFile {
            coins: vec![
                entry("ETHUSDT", StrategyVariant::Selective),
                entry("ETHUSDT", StrategyVariant::Aggressive),
            ],
        };
        assert!(resolve_coin_params(&file).is_err());
    }
}
