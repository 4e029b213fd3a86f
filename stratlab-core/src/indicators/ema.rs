//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = alpha * close[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1)
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! Lookback: period - 1.

use super::{closes, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        ema_of_series(&closes(candles), self.period)
    }
}

/// EMA of an arbitrary series.
///
/// Leading NaNs are skipped, so the EMA of a derived series (e.g. the MACD line)
/// seeds at its first `period` valid values. A NaN after the seed taints the rest.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };
    if n - start < period {
        return result;
    }

    let seed_end = start + period;
    let window = &values[start..seed_end];
    if window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = window.iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let ema = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = ema;
        prev = ema;
    }

    result
}
