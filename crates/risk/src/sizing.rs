use configuration::CoinParams;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::RiskError;

/// Quantities below this are dust and rejected outright.
const MIN_QUANTITY: Decimal = dec!(0.00000001);

/// Fixed-fraction position sizing for two-way entries.
///
/// Each leg gets `equity * position_size_fraction * leverage` of notional;
/// there is no liquidity- or volatility-aware adjustment beyond that. The
/// equity figure is read once at the start of the entry attempt and not
/// re-read if a concurrent close changes it.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    position_size_fraction: Decimal,
    leverage: u32,
}

impl PositionSizer {
    pub fn new(params: &CoinParams) -> Result<Self, RiskError> {
        if params.position_size_fraction <= Decimal::ZERO
            || params.position_size_fraction > Decimal::ONE
        {
            return Err(RiskError::InvalidParameters(
                "position_size_fraction must be in (0, 1]".into(),
            ));
        }
        if params.leverage < 1 {
            return Err(RiskError::InvalidParameters("leverage must be >= 1".into()));
        }
        Ok(Self {
            position_size_fraction: params.position_size_fraction,
            leverage: params.leverage,
        })
    }

    /// The base-asset quantity for one leg of a two-way entry.
    pub fn quantity(&self, equity: Decimal, entry_price: Decimal) -> Result<Decimal, RiskError> {
        if equity <= Decimal::ZERO {
            return Err(RiskError::InsufficientEquity(equity));
        }
        if entry_price <= Decimal::ZERO {
            return Err(RiskError::Calculation(format!(
                "entry price {entry_price} is not positive"
            )));
        }

        let notional = equity * self.position_size_fraction * Decimal::from(self.leverage);
        let quantity = (notional / entry_price).round_dp(8);
        if quantity < MIN_QUANTITY {
            return Err(RiskError::Calculation(format!(
                "quantity {quantity} is below the dust threshold"
            )));
        }
        debug!(%equity, %entry_price, %notional, %quantity, "sized entry leg");
        Ok(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use configuration::{CoinParamsEntry, StrategyVariant};

    fn params(fraction: Decimal, leverage: u32) -> CoinParams {
        CoinParamsEntry {
            symbol: "ETHUSDT".to_string(),
            excluded: false,
            strategy_variant: StrategyVariant::Conservative,
            hybrid_vol_threshold_pct: None,
            atr_vol_threshold_pct: None,
            bb_band_min: None,
            bb_band_max: None,
            cooldown_seconds: None,
            position_size_fraction: fraction,
            leverage,
            hard_stop_atr_multiplier: 2.0,
            min_loss_floor_pct: 0.01,
            bb_bandwidth_threshold: 0.05,
            entry_strength_min: 0.5,
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn notional_is_fraction_times_leverage() {
        // 10_000 * 0.1 * 10 = 10_000 notional; at price 100 -> 100 units.
        let sizer = PositionSizer::new(&params(dec!(0.1), 10)).unwrap();
        let quantity = sizer.quantity(dec!(10000), dec!(100)).unwrap();
        assert_eq!(quantity, dec!(100));
    }

    #[test]
    fn nonpositive_equity_is_rejected() {
        let sizer = PositionSizer::new(&params(dec!(0.1), 10)).unwrap();
        assert!(matches!(
            sizer.quantity(dec!(0), dec!(100)),
            Err(RiskError::InsufficientEquity(_))
        ));
        assert!(matches!(
            sizer.quantity(dec!(-50), dec!(100)),
            Err(RiskError::InsufficientEquity(_))
        ));
    }

    #[test]
    fn dust_quantities_are_rejected() {
        let sizer = PositionSizer::new(&params(dec!(0.0001), 1)).unwrap();
        // 0.01 of equity at an absurd price rounds to zero units.
        assert!(sizer.quantity(dec!(0.0001), dec!(1000000000)).is_err());
    }
}
