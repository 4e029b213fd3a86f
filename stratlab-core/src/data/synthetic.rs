//! Deterministic synthetic OHLCV generator.
//!
//! A multiplicative random walk from a base price, seeded from
//! BLAKE3(symbol, timeframe) so the same request regenerates the same shape.
//! Per candle:
//! - open  = previous close × (1 + U(-1.25%, +1.25%))
//! - close = open × (1 + U(-0.625%, +0.625%))
//! - high/low extend the body by up to 0.5% of open
//! - volume = U(0, 1000)
//!
//! Stands in for real market data; it makes no claim to realism.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::provider::{
    align_to_interval, check_request, expected_len, system_clock, Clock, DataError, DataSource,
    FetchResult, MarketDataProvider,
};
use crate::domain::{Candle, Timeframe};

pub const DEFAULT_BASE_PRICE: f64 = 40_000.0;

const STEP_RANGE: f64 = 0.025;
const BODY_RANGE: f64 = 0.0125;
const WICK_RANGE: f64 = 0.005;
const MAX_VOLUME: f64 = 1000.0;

/// Seed derived from `(symbol, timeframe)`.
pub fn walk_seed(symbol: &str, timeframe: Timeframe) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(b"\0");
    hasher.update(timeframe.as_str().as_bytes());
    let hash = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(seed)
}

/// Generate `count` candles whose last candle opens one interval before `end_ms`.
pub fn generate(
    symbol: &str,
    timeframe: Timeframe,
    count: usize,
    end_ms: i64,
    base_price: f64,
) -> Vec<Candle> {
    let interval = timeframe.interval_ms();
    let start = end_ms - count as i64 * interval;
    let mut rng = StdRng::seed_from_u64(walk_seed(symbol, timeframe));

    let mut price = base_price;
    let mut candles = Vec::with_capacity(count);
    for i in 0..count {
        let open = price * (1.0 + (rng.gen::<f64>() - 0.5) * STEP_RANGE);
        let close = open * (1.0 + (rng.gen::<f64>() - 0.5) * BODY_RANGE);
        let high = open.max(close) + open * rng.gen::<f64>() * WICK_RANGE;
        let low = open.min(close) - open * rng.gen::<f64>() * WICK_RANGE;
        candles.push(Candle {
            time: start + i as i64 * interval,
            open,
            high,
            low,
            close,
            volume: rng.gen::<f64>() * MAX_VOLUME,
        });
        price = close;
    }
    candles
}

pub struct SyntheticProvider {
    base_price: f64,
    clock: Arc<dyn Clock>,
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PRICE)
    }
}

impl SyntheticProvider {
    pub fn new(base_price: f64) -> Self {
        Self {
            base_price,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        months: u32,
    ) -> Result<FetchResult, DataError> {
        check_request(symbol, months)?;
        if !(self.base_price.is_finite() && self.base_price > 0.0) {
            return Err(DataError::InvalidRequest(format!(
                "base price must be positive, got {}",
                self.base_price
            )));
        }

        let count = expected_len(timeframe, months);
        let end = align_to_interval(self.clock.now_ms(), timeframe);
        debug!(symbol, %timeframe, count, "generating synthetic candles");

        Ok(FetchResult {
            symbol: symbol.to_string(),
            timeframe,
            candles: generate(symbol, timeframe, count, end, self.base_price),
            source: DataSource::Synthetic,
            warnings: Vec::new(),
        })
    }
}
