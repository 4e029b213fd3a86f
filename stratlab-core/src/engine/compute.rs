//! Indicator computation: declared indicators → Dataframe.
//!
//! Dispatch is on the declared function kind (case-insensitive). Multi-output
//! functions select their line from the declared column name, e.g. a MACD
//! column whose name contains `signal` gets the signal line.
//!
//! A declaration that cannot be computed (unsupported function, invalid
//! parameter) never fails the run: it is reported as a warning and its column
//! is filled according to the [`DegradePolicy`]. Other columns are unaffected.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::dataframe::Dataframe;
use crate::domain::{Candle, IndicatorConfig, ParamValue};
use crate::indicators::{
    Atr, Bollinger, BollingerBand, Ema, Indicator, Macd, MacdLine, Rsi, Sma, Stochastic,
    StochasticLine,
};

/// What a column holds when its indicator could not be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradePolicy {
    /// All zeros. Conditions on the column evaluate against 0.
    #[default]
    ZeroFill,
    /// All `NaN`. Every candle is skipped for decisions.
    Unavailable,
}

impl DegradePolicy {
    fn fill_value(self) -> f64 {
        match self {
            DegradePolicy::ZeroFill => 0.0,
            DegradePolicy::Unavailable => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("unsupported indicator function '{0}'")]
    Unsupported(String),

    #[error("invalid parameter {param}={value} for {function}: {reason}")]
    InvalidParam {
        function: String,
        param: String,
        value: String,
        reason: &'static str,
    },
}

/// Output of [`IndicatorEngine::compute`].
#[derive(Debug, Clone, Default)]
pub struct ComputedIndicators {
    pub dataframe: Dataframe,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorEngine {
    policy: DegradePolicy,
}

impl IndicatorEngine {
    pub fn new(policy: DegradePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> DegradePolicy {
        self.policy
    }

    pub fn compute(&self, candles: &[Candle], configs: &[IndicatorConfig]) -> ComputedIndicators {
        let mut dataframe = Dataframe::new(candles.len());
        let mut warnings = Vec::new();

        for config in configs {
            let series = match build_indicator(config) {
                Ok(indicator) => {
                    debug!(
                        column = %config.name,
                        indicator = indicator.name(),
                        lookback = indicator.lookback(),
                        "computing indicator"
                    );
                    indicator.compute(candles)
                }
                Err(e) => {
                    let message = format!(
                        "indicator '{}' ({}): {e}; column degraded to {}",
                        config.name,
                        config.function,
                        match self.policy {
                            DegradePolicy::ZeroFill => "zeros",
                            DegradePolicy::Unavailable => "unavailable",
                        }
                    );
                    warn!("{message}");
                    warnings.push(message);
                    vec![self.policy.fill_value(); candles.len()]
                }
            };
            dataframe.insert(config.name.clone(), series);
        }

        ComputedIndicators {
            dataframe,
            warnings,
        }
    }
}

/// Compute every declared indicator with the default (zero-fill) policy.
pub fn compute_indicators(candles: &[Candle], configs: &[IndicatorConfig]) -> Dataframe {
    IndicatorEngine::default().compute(candles, configs).dataframe
}

// ─── Dispatch ───────────────────────────────────────────────────────

/// Build the concrete indicator for one declaration.
pub fn build_indicator(config: &IndicatorConfig) -> Result<Box<dyn Indicator>, IndicatorError> {
    let column = config.name.to_ascii_lowercase();
    let kind = config.function.to_ascii_uppercase();

    let indicator: Box<dyn Indicator> = match kind.as_str() {
        "RSI" => Box::new(Rsi::new(period(config, "timeperiod", 14)?)),
        "EMA" => Box::new(Ema::new(period(config, "timeperiod", 20)?)),
        "SMA" => Box::new(Sma::new(period(config, "timeperiod", 20)?)),
        "ATR" => Box::new(Atr::new(period(config, "timeperiod", 14)?)),
        "MACD" => {
            let line = if column.contains("signal") {
                MacdLine::Signal
            } else if column.contains("hist") {
                MacdLine::Histogram
            } else {
                MacdLine::Macd
            };
            Box::new(Macd::new(
                line,
                period(config, "fastperiod", 12)?,
                period(config, "slowperiod", 26)?,
                period(config, "signalperiod", 9)?,
            ))
        }
        "BBANDS" | "BB" => {
            let band = if column.contains("upper") {
                BollingerBand::Upper
            } else if column.contains("lower") {
                BollingerBand::Lower
            } else {
                BollingerBand::Middle
            };
            Box::new(Bollinger::new(
                band,
                period(config, "timeperiod", 20)?,
                multiplier(config, "nbdevup", 2.0)?,
            ))
        }
        "STOCH" | "STOCHASTIC" => {
            let line = if column.contains("slowd") {
                StochasticLine::D
            } else {
                StochasticLine::K
            };
            // slowk_period is validated but %K is left unsmoothed
            period(config, "slowk_period", 3)?;
            Box::new(Stochastic::new(
                line,
                period(config, "fastk_period", 14)?,
                period(config, "slowd_period", 3)?,
            ))
        }
        _ => return Err(IndicatorError::Unsupported(config.function.clone())),
    };

    Ok(indicator)
}

fn invalid(
    config: &IndicatorConfig,
    key: &str,
    value: &ParamValue,
    reason: &'static str,
) -> IndicatorError {
    IndicatorError::InvalidParam {
        function: config.function.clone(),
        param: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

/// A window length. Missing or zero selects the default.
fn period(config: &IndicatorConfig, key: &str, default: usize) -> Result<usize, IndicatorError> {
    let Some(value) = config.params.get(key) else {
        return Ok(default);
    };
    let Some(v) = value.as_number() else {
        return Err(invalid(config, key, value, "not a number"));
    };
    if v == 0.0 {
        return Ok(default);
    }
    if !v.is_finite() || v < 0.0 {
        return Err(invalid(config, key, value, "period must be positive"));
    }
    if v.fract() != 0.0 {
        return Err(invalid(config, key, value, "period must be a whole number"));
    }
    Ok(v as usize)
}

/// A positive scale factor. Missing or zero selects the default.
fn multiplier(config: &IndicatorConfig, key: &str, default: f64) -> Result<f64, IndicatorError> {
    let Some(value) = config.params.get(key) else {
        return Ok(default);
    };
    match value.as_number() {
        Some(v) if v == 0.0 => Ok(default),
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(_) => Err(invalid(config, key, value, "multiplier must be positive")),
        None => Err(invalid(config, key, value, "not a number")),
    }
}
