//! Moving Average Convergence/Divergence (MACD).
//!
//! MACD line: EMA(close, fast) - EMA(close, slow)
//! Signal: EMA(MACD line, signal)
//! Histogram: MACD line - signal
//!
//! Lookback: slow - 1 for the MACD line, slow + signal - 2 for signal and histogram.

use super::ema::ema_of_series;
use super::{closes, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
    Histogram,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
    name: String,
}

impl Macd {
    pub fn new(line: MacdLine, fast: usize, slow: usize, signal: usize) -> Self {
        assert!(
            fast >= 1 && slow >= 1 && signal >= 1,
            "MACD periods must be >= 1"
        );
        let prefix = match line {
            MacdLine::Macd => "macd",
            MacdLine::Signal => "macd_signal",
            MacdLine::Histogram => "macd_hist",
        };
        Self {
            fast,
            slow,
            signal,
            line,
            name: format!("{prefix}_{fast}_{slow}_{signal}"),
        }
    }
}

/// MACD line, signal line and histogram for a close series.
pub fn macd_lines(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema_of_series(values, fast);
    let slow_ema = ema_of_series(values, slow);
    let macd: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema_of_series(&macd, signal);
    let histogram = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();
    (macd, signal_line, histogram)
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        let base = self.fast.max(self.slow).saturating_sub(1);
        match self.line {
            MacdLine::Macd => base,
            MacdLine::Signal | MacdLine::Histogram => {
                base.saturating_add(self.signal.saturating_sub(1))
            }
        }
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let (macd, signal, hist) = macd_lines(&closes(candles), self.fast, self.slow, self.signal);
        match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => signal,
            MacdLine::Histogram => hist,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn macd_line_is_ema_difference() {
        // fast=1 makes the fast EMA the close itself; slow=3 seeds at index 2
        let candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = Macd::new(MacdLine::Macd, 1, 3, 2).compute(&candles);
        assert!(result[1].is_nan());
        assert_approx(result[2], 12.0 - 11.0, DEFAULT_EPSILON);
        assert_approx(result[3], 13.0 - 12.0, DEFAULT_EPSILON);
        assert_approx(result[4], 14.0 - 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn signal_warmup_is_unavailable() {
        let candles = make_candles(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let signal = Macd::new(MacdLine::Signal, 1, 3, 2).compute(&candles);
        let hist = Macd::new(MacdLine::Histogram, 1, 3, 2).compute(&candles);
        assert!(signal[..3].iter().all(|v| v.is_nan()));
        assert!(hist[..3].iter().all(|v| v.is_nan()));
        // MACD line is constant 1.0, so signal = 1.0 and histogram = 0
        assert_approx(signal[3], 1.0, DEFAULT_EPSILON);
        assert_approx(hist[4], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn macd_lookbacks() {
        assert_eq!(Macd::new(MacdLine::Macd, 12, 26, 9).lookback(), 25);
        assert_eq!(Macd::new(MacdLine::Signal, 12, 26, 9).lookback(), 33);
        assert_eq!(Macd::new(MacdLine::Signal, 12, 26, 9).name(), "macd_signal_12_26_9");
        let huge = Macd::new(MacdLine::Histogram, 12, usize::MAX, usize::MAX);
        assert_eq!(huge.lookback(), usize::MAX);
    }
}
