//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (EMA with alpha = 1/period).
//! Lookback: period (TR[0] has no previous close and is not used).

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// True Range series. TR[0] = high[0] - low[0].
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        let range = c.high - c.low;
        if i == 0 {
            tr.push(range);
            continue;
        }
        let pc = candles[i - 1].close;
        if range.is_nan() || pc.is_nan() {
            tr.push(f64::NAN);
        } else {
            tr.push(range.max((c.high - pc).abs()).max((c.low - pc).abs()));
        }
    }
    tr
}

/// Wilder smoothing with alpha = 1/period.
///
/// Seeds with the mean of the first `period` consecutive valid values; a NaN
/// after the seed makes the remainder NaN.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    // First run of `period` consecutive valid values.
    let mut run = 0usize;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_nan() {
            run = 0;
            continue;
        }
        run += 1;
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        let smoothed = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = smoothed;
        prev = smoothed;
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let mut tr = true_range(candles);
        if let Some(first) = tr.first_mut() {
            *first = f64::NAN;
        }
        wilder_smooth(&tr, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn make_ohlc(data: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                time: i as i64 * 60_000,
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn true_range_basic() {
        let candles = make_ohlc(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, 6, 2) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, 1, 8) = 9
        ]);
        let tr = true_range(&candles);
        assert_approx(tr[0], 10.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let candles = make_ohlc(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, 15, 8) = 15
        ]);
        assert_approx(true_range(&candles)[1], 15.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let candles = make_ohlc(&[
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 103.0, 97.0, 101.0),   // TR = 6
            (101.0, 106.0, 100.0, 105.0), // TR = 6
        ]);
        let result = Atr::new(3).compute(&candles);

        assert!(result[..3].iter().all(|v| v.is_nan()));
        // seed = mean(8, 9, 6); next = (1/3)*6 + (2/3)*(23/3)
        assert_approx(result[3], 23.0 / 3.0, DEFAULT_EPSILON);
        assert_approx(result[4], 64.0 / 9.0, DEFAULT_EPSILON);
    }

    #[test]
    fn wilder_smooth_restarts_seed_after_leading_gap() {
        let values = [f64::NAN, 1.0, f64::NAN, 2.0, 4.0, 6.0];
        let result = wilder_smooth(&values, 2);
        assert!(result[..4].iter().all(|v| v.is_nan()));
        assert_approx(result[4], 3.0, DEFAULT_EPSILON);
        assert_approx(result[5], 4.5, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_lookback() {
        assert_eq!(Atr::new(14).lookback(), 14);
    }
}
