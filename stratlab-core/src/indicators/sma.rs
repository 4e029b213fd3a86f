//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::{closes, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        sma_of_series(&closes(candles), self.period)
    }
}

/// Rolling mean of an arbitrary series. Any window containing NaN yields NaN,
/// so leading warm-up NaNs of a derived series shift the output accordingly.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for i in 0..n {
        let entering = values[i];
        if entering.is_nan() {
            nan_count += 1;
        } else {
            sum += entering;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn sma_3_known_values() {
        let candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = Sma::new(3).compute(&candles);
        assert!(result[0].is_nan());
        assert!(result[1].is_nan());
        assert_approx(result[2], 2.0, DEFAULT_EPSILON);
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_only_affects_its_windows() {
        let mut candles = make_candles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        candles[1].close = f64::NAN;
        let result = Sma::new(2).compute(&candles);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert_approx(result[3], 3.5, DEFAULT_EPSILON);
        assert_approx(result[5], 5.5, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_of_series_with_warmup_prefix() {
        let values = [f64::NAN, 2.0, 4.0, 6.0];
        let result = sma_of_series(&values, 2);
        assert!(result[1].is_nan());
        assert_approx(result[2], 3.0, DEFAULT_EPSILON);
        assert_approx(result[3], 5.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_short_input() {
        let candles = make_candles(&[1.0, 2.0]);
        assert!(Sma::new(3).compute(&candles).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn sma_lookback() {
        assert_eq!(Sma::new(20).lookback(), 19);
    }
}
