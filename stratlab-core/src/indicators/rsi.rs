//! Relative Strength Index (RSI).
//!
//! Uses Wilder smoothing of average gains and average losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Lookback: period.
//! Edge cases: avg_loss == 0 → RSI = 100; avg_gain == 0 → RSI = 0; no movement → 50.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period + 1 {
            return result;
        }

        let changes: Vec<f64> = std::iter::once(f64::NAN)
            .chain(candles.windows(2).map(|w| w[1].close - w[0].close))
            .collect();

        // Seed: simple averages over the first `period` changes
        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;
        for &ch in &changes[1..=self.period] {
            if ch.is_nan() {
                return result;
            }
            if ch > 0.0 {
                avg_gain += ch;
            } else {
                avg_loss -= ch;
            }
        }
        avg_gain /= self.period as f64;
        avg_loss /= self.period as f64;
        result[self.period] = compute_rsi(avg_gain, avg_loss);

        let alpha = 1.0 / self.period as f64;
        for i in (self.period + 1)..n {
            let ch = changes[i];
            if ch.is_nan() {
                // NaN taints everything after it
                return result;
            }
            let gain = ch.max(0.0);
            let loss = (-ch).max(0.0);
            avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
            result[i] = compute_rsi(avg_gain, avg_loss);
        }

        result
    }
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles};

    #[test]
    fn rsi_all_gains() {
        let candles = make_candles(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        let result = Rsi::new(3).compute(&candles);
        assert_approx(result[3], 100.0, 1e-6);
        assert_approx(result[5], 100.0, 1e-6);
    }

    #[test]
    fn rsi_all_losses() {
        let candles = make_candles(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0]);
        let result = Rsi::new(3).compute(&candles);
        assert_approx(result[3], 0.0, 1e-6);
    }

    #[test]
    fn rsi_wilder_step() {
        // Changes: +0.34, -0.25, -0.48, +0.72
        // Seed (period 3): avg_gain = 0.34/3, avg_loss = 0.73/3
        // Step: avg_gain = (0.72 + 2*0.34/3)/3, avg_loss = (2*0.73/3)/3
        let candles = make_candles(&[44.0, 44.34, 44.09, 43.61, 44.33]);
        let result = Rsi::new(3).compute(&candles);

        assert!(result[..3].iter().all(|v| v.is_nan()));
        let seed = 100.0 - 100.0 / (1.0 + 0.34 / 0.73);
        assert_approx(result[3], seed, 1e-9);
        let gain = (0.72 + 2.0 * 0.34 / 3.0) / 3.0;
        let loss = (2.0 * 0.73 / 3.0) / 3.0;
        assert_approx(result[4], 100.0 - 100.0 / (1.0 + gain / loss), 1e-9);
    }

    #[test]
    fn rsi_bounds() {
        let candles = make_candles(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0]);
        let result = Rsi::new(3).compute(&candles);
        for (i, &v) in result.iter().enumerate() {
            if !v.is_nan() {
                assert!((0.0..=100.0).contains(&v), "RSI out of bounds at {i}: {v}");
            }
        }
    }

    #[test]
    fn rsi_flat_is_fifty() {
        let candles = make_candles(&[100.0; 6]);
        assert_approx(Rsi::new(3).compute(&candles)[4], 50.0, 1e-12);
    }

    #[test]
    fn rsi_nan_in_seed_window() {
        let mut candles = make_candles(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        candles[2].close = f64::NAN;
        assert!(Rsi::new(3).compute(&candles).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_short_input_is_unavailable() {
        let candles = make_candles(&[1.0, 2.0, 3.0]);
        let result = Rsi::new(3).compute(&candles);
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_lookback() {
        assert_eq!(Rsi::new(14).lookback(), 14);
        assert_eq!(Rsi::new(14).name(), "rsi_14");
    }
}
