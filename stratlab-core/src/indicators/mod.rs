//! Concrete indicator implementations.
//!
//! Every indicator implements [`Indicator`] and is computed once over the full
//! candle sequence before simulation. Output series always have one entry per
//! candle; warm-up entries are `f64::NAN` ("unavailable").
//!
//! Multi-series indicators (MACD, Bollinger, Stochastic) are exposed as
//! separate instances per line or band, keeping the single-series trait.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticLine};

use crate::domain::Candle;

/// A precomputed technical indicator.
///
/// Implementations must be pure: the same candles produce the same series, and
/// the series length always equals `candles.len()`.
pub trait Indicator: Send + Sync {
    /// Canonical id including parameters, e.g. `rsi_14`.
    fn name(&self) -> &str;

    /// Number of leading entries that are unavailable on clean data.
    fn lookback(&self) -> usize;

    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Close prices as a plain series.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Create synthetic 5-minute candles from close prices for testing.
///
/// open = prev_close (or close for the first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    const T0: i64 = 1_704_067_200_000; // 2024-01-01 00:00:00 UTC
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                time: T0 + i as i64 * 300_000,
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
