//! Stochastic oscillator.
//!
//! %K[t] = 100 * (close - lowest_low) / (highest_high - lowest_low) over `fastk` candles.
//! A flat window (highest == lowest) has no %K and stays NaN.
//! %D = SMA(%K, slowd).
//!
//! %K is not smoothed: a `slowk_period` parameter is accepted by the engine but not applied.
//!
//! Lookback: fastk - 1 for %K, plus slowd - 1 for %D.

use super::sma::sma_of_series;
use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StochasticLine {
    K,
    D,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    fastk: usize,
    slowd: usize,
    line: StochasticLine,
    name: String,
}

impl Stochastic {
    pub fn new(line: StochasticLine, fastk: usize, slowd: usize) -> Self {
        assert!(fastk >= 1 && slowd >= 1, "Stochastic periods must be >= 1");
        let name = match line {
            StochasticLine::K => format!("stoch_k_{fastk}"),
            StochasticLine::D => format!("stoch_d_{fastk}_{slowd}"),
        };
        Self {
            fastk,
            slowd,
            line,
            name,
        }
    }
}

/// Raw (fast) %K series.
pub fn fast_k(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    for i in (period - 1)..n {
        let window = &candles[i + 1 - period..=i];
        let mut highest = f64::NEG_INFINITY;
        let mut lowest = f64::INFINITY;
        let mut valid = true;
        for c in window {
            if c.high.is_nan() || c.low.is_nan() {
                valid = false;
                break;
            }
            highest = highest.max(c.high);
            lowest = lowest.min(c.low);
        }
        let close = candles[i].close;
        if !valid || close.is_nan() {
            continue;
        }
        let range = highest - lowest;
        if range > 0.0 {
            result[i] = 100.0 * (close - lowest) / range;
        }
    }

    result
}

impl Indicator for Stochastic {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let k = self.fastk.saturating_sub(1);
        match self.line {
            StochasticLine::K => k,
            StochasticLine::D => k.saturating_add(self.slowd.saturating_sub(1)),
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let k = fast_k(candles, self.fastk);
        match self.line {
            StochasticLine::K => k,
            StochasticLine::D => sma_of_series(&k, self.slowd),
        }
    }
}
