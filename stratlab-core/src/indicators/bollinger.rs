//! Bollinger Bands: moving average +/- standard deviation multiplier.
//!
//! Three bands (separate Indicator instances):
//! - Middle: SMA(close, period)
//! - Upper: middle + mult * stddev(close, period)
//! - Lower: middle - mult * stddev(close, period)
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
}

impl BollingerBand {
    fn label(self) -> &'static str {
        match self {
            BollingerBand::Upper => "upper",
            BollingerBand::Middle => "middle",
            BollingerBand::Lower => "lower",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(band: BollingerBand, period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            band,
            name: format!("bollinger_{}_{period}_{multiplier}", band.label()),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Upper, period, multiplier)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Middle, period, multiplier)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Lower, period, multiplier)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let n = candles.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let window = &candles[i + 1 - self.period..=i];
            if window.iter().any(|c| c.close.is_nan()) {
                continue;
            }
            let mean = window.iter().map(|c| c.close).sum::<f64>() / self.period as f64;

            result[i] = match self.band {
                BollingerBand::Middle => mean,
                BollingerBand::Upper | BollingerBand::Lower => {
                    let variance = window
                        .iter()
                        .map(|c| (c.close - mean).powi(2))
                        .sum::<f64>()
                        / self.period as f64;
                    let offset = self.multiplier * variance.sqrt();
                    if self.band == BollingerBand::Upper {
                        mean + offset
                    } else {
                        mean - offset
                    }
                }
            };
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn bands_known_values() {
        // window [2, 4, 6]: mean 4, population variance 8/3
        let candles = make_candles(&[2.0, 4.0, 6.0]);
        let sd = (8.0f64 / 3.0).sqrt();

        let mid = Bollinger::middle(3, 2.0).compute(&candles);
        let up = Bollinger::upper(3, 2.0).compute(&candles);
        let lo = Bollinger::lower(3, 2.0).compute(&candles);

        assert!(mid[1].is_nan());
        assert_approx(mid[2], 4.0, DEFAULT_EPSILON);
        assert_approx(up[2], 4.0 + 2.0 * sd, DEFAULT_EPSILON);
        assert_approx(lo[2], 4.0 - 2.0 * sd, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_series_collapses_bands() {
        let candles = make_candles(&[50.0; 5]);
        let up = Bollinger::upper(3, 2.0).compute(&candles);
        let lo = Bollinger::lower(3, 2.0).compute(&candles);
        assert_approx(up[4], 50.0, DEFAULT_EPSILON);
        assert_approx(lo[4], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn names_include_band_and_params() {
        assert_eq!(Bollinger::upper(20, 2.0).name(), "bollinger_upper_20_2");
        assert_eq!(Bollinger::lower(10, 1.5).name(), "bollinger_lower_10_1.5");
    }
}
