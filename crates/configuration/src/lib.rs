use std::collections::HashMap;
use std::path::Path;

use rust_decimal_macros::dec;

use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod coins;
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use coins::{resolve_coin_params, CoinParams, CoinParamsEntry, CoinParamsFile, StrategyVariant};
pub use settings::{
    Config, EngineSettings, ExecutionMode, Logging, Persistence, Simulation,
};

/// Loads the application configuration from the specified path.
///
/// If `config_path` is `None`, looks for `config.toml` in the current
/// directory. Environment variables prefixed `STRADDLE_` override file
/// values (e.g. `STRADDLE_SIMULATION__TAKER_FEE_PCT`).
pub fn load_config(config_path: Option<&str>) -> Result<Config, ConfigError> {
    let config_path = config_path.unwrap_or("config.toml");

    if !Path::new(config_path).exists() {
        return Err(ConfigError::FileNotFound(config_path.to_string()));
    }

    let builder = config::Config::builder()
        .add_source(config::File::with_name(config_path).required(true))
        .add_source(
            config::Environment::with_prefix("STRADDLE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = builder.try_deserialize()?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates the configuration values after loading.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.engine.initial_equity <= dec!(0) {
        return Err(ConfigError::ValidationError(
            "initial_equity must be positive".into(),
        ));
    }
    if config.engine.buffer_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "buffer_capacity must be at least 1".into(),
        ));
    }
    if config.engine.signal_every_ticks == 0 {
        return Err(ConfigError::ValidationError(
            "signal_every_ticks must be at least 1".into(),
        ));
    }
    if config.engine.atr_subwindow_ticks == 0 {
        return Err(ConfigError::ValidationError(
            "atr_subwindow_ticks must be at least 1".into(),
        ));
    }

    if config.simulation.taker_fee_pct.is_sign_negative()
        || config.simulation.taker_fee_pct > dec!(1.0)
    {
        return Err(ConfigError::ValidationError(
            "taker_fee_pct must be between 0 and 1".into(),
        ));
    }
    if config.simulation.maker_fee_pct.is_sign_negative()
        || config.simulation.maker_fee_pct > dec!(1.0)
    {
        return Err(ConfigError::ValidationError(
            "maker_fee_pct must be between 0 and 1".into(),
        ));
    }
    if config.simulation.slippage_pct.is_sign_negative()
        || config.simulation.slippage_pct > dec!(1.0)
    {
        return Err(ConfigError::ValidationError(
            "slippage_pct must be between 0 and 1".into(),
        ));
    }

    Ok(())
}

/// Loads the coin-parameter file from a specific TOML path and resolves
/// every entry against its variant preset.
pub fn load_coin_params(path: &Path) -> Result<HashMap<String, CoinParams>, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;
    let file: CoinParamsFile = builder.try_deserialize()?;
    resolve_coin_params(&file)
}

/// Installs the global `tracing` subscriber from the logging settings.
pub fn init_tracing(logging: &Logging) -> Result<(), ConfigError> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| ConfigError::TracingInit(e.to_string()))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| ConfigError::TracingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn config_round_trips_through_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[engine]
initial_equity = "10000"

[simulation]
taker_fee_pct = "0.0005"
maker_fee_pct = "0.0002"
slippage_pct = "0.0001"

[persistence]
trade_log_path = "data/closed_trades.jsonl"
open_positions_path = "data/open_positions.json"

[logging]
level = "info"
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.engine.buffer_capacity, 10_000);
        assert_eq!(config.engine.signal_every_ticks, 10);
        assert_eq!(config.simulation.market_order_deadline_secs, 5);
        assert_eq!(config.simulation.limit_order_deadline_secs, 30);
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_is_reported_as_such() {
        let err = load_config(Some("does-not-exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn coin_params_file_loads_and_resolves() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[[coin]]
symbol = "ETHUSDT"
strategy_variant = "selective"

[[coin]]
symbol = "SOLUSDT"
strategy_variant = "aggressive"
excluded = true
leverage = 5
"#
        )
        .unwrap();

        let coins = load_coin_params(file.path()).unwrap();
        assert_eq!(coins.len(), 2);
        assert!(coins["SOLUSDT"].excluded);
        assert_eq!(coins["SOLUSDT"].leverage, 5);
        assert_eq!(coins["ETHUSDT"].min_momentum, Some(1e-4));
    }
}
