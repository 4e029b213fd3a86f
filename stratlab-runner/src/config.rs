//! Run configuration loaded from TOML.
//!
//! Every section and field is optional:
//!
//! ```toml
//! [backtest]
//! symbol = "BTC/USDT"
//! months = 3
//! starting_balance = 1000.0
//! # timeframe = "1h"
//!
//! [data]
//! source = "synthetic"
//! cache_dir = ".stratlab/cache"
//! cache_ttl_hours = 24
//! base_price = 40000.0
//!
//! [simulation]
//! degraded_indicators = "zero_fill"
//! sizing = { type = "ALL_IN" }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::data::DEFAULT_BASE_PRICE;
use stratlab_core::engine::{DegradePolicy, SizingConfig, SizingError};
use stratlab_core::Timeframe;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Sizing(#[from] SizingError),
}

/// Complete configuration for one or more runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub backtest: BacktestSection,
    pub data: DataSection,
    pub simulation: SimulationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestSection {
    pub symbol: String,
    pub months: u32,
    pub starting_balance: f64,
    /// Overrides the timeframe declared by the strategy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<Timeframe>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            symbol: "BTC/USDT".to_string(),
            months: 3,
            starting_balance: 1000.0,
            timeframe: None,
        }
    }
}

/// Which provider sits behind the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Binance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSection {
    pub source: SourceKind,
    pub cache_dir: PathBuf,
    pub cache_ttl_hours: u64,
    /// Starting price of the synthetic walk.
    pub base_price: f64,
    /// Alternative REST endpoint for the Binance provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binance_url: Option<String>,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            cache_dir: PathBuf::from(".stratlab/cache"),
            cache_ttl_hours: 24,
            base_price: DEFAULT_BASE_PRICE,
            binance_url: None,
        }
    }
}

impl DataSection {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSection {
    pub degraded_indicators: DegradePolicy,
    pub sizing: SizingConfig,
}

impl RunConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        if b.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("backtest.symbol must not be empty".into()));
        }
        if b.months == 0 {
            return Err(ConfigError::Invalid("backtest.months must be >= 1".into()));
        }
        if !(b.starting_balance.is_finite() && b.starting_balance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "backtest.starting_balance must be positive, got {}",
                b.starting_balance
            )));
        }
        if self.data.cache_ttl_hours == 0 {
            return Err(ConfigError::Invalid("data.cache_ttl_hours must be > 0".into()));
        }
        if !(self.data.base_price.is_finite() && self.data.base_price > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "data.base_price must be positive, got {}",
                self.data.base_price
            )));
        }
        self.simulation.sizing.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.backtest.symbol, "BTC/USDT");
        assert_eq!(config.backtest.months, 3);
        assert_eq!(config.data.cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.simulation.sizing, SizingConfig::AllIn);
    }

    #[test]
    fn full_config_parses() {
        let config = RunConfig::from_toml_str(
            r#"
[backtest]
symbol = "ETH/USDT"
months = 6
starting_balance = 5000.0
timeframe = "1h"

[data]
source = "binance"
cache_dir = "/tmp/stratlab"
cache_ttl_hours = 2

[simulation]
degraded_indicators = "unavailable"
sizing = { type = "FRACTION", fraction = 0.5 }
"#,
        )
        .unwrap();

        assert_eq!(config.backtest.symbol, "ETH/USDT");
        assert_eq!(config.backtest.timeframe, Some(Timeframe::H1));
        assert_eq!(config.data.source, SourceKind::Binance);
        assert_eq!(config.data.cache_dir, PathBuf::from("/tmp/stratlab"));
        assert_eq!(config.data.base_price, DEFAULT_BASE_PRICE);
        assert_eq!(config.simulation.degraded_indicators, DegradePolicy::Unavailable);
        assert_eq!(config.simulation.sizing, SizingConfig::Fraction { fraction: 0.5 });
    }

    #[test]
    fn rejects_invalid_values() {
        for toml in [
            "[backtest]\nmonths = 0",
            "[backtest]\nstarting_balance = -1.0",
            "[backtest]\nsymbol = \"  \"",
            "[data]\ncache_ttl_hours = 0",
            "[simulation]\nsizing = { type = \"FRACTION\", fraction = 1.5 }",
        ] {
            assert!(RunConfig::from_toml_str(toml).is_err(), "accepted: {toml}");
        }
    }

    #[test]
    fn rejects_unknown_fields_and_timeframes() {
        assert!(matches!(
            RunConfig::from_toml_str("[backtest]\nsymbl = \"X\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            RunConfig::from_toml_str("[backtest]\ntimeframe = \"2h\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunConfig::from_file(Path::new("/nonexistent/stratlab.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = RunConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), config);
    }
}
