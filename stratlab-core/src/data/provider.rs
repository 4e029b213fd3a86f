//! Market data provider trait and structured error types.
//!
//! The MarketDataProvider trait abstracts over data sources (synthetic walk,
//! Binance klines) so the cache can wrap any of them and tests can mock them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, Timeframe};

/// Structured error types for data operations.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Where the candles came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Synthetic,
    Binance,
    Cache,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataSource::Synthetic => "synthetic",
            DataSource::Binance => "binance",
            DataSource::Cache => "cache",
        })
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Ascending by time.
    pub candles: Vec<Candle>,
    pub source: DataSource,
    /// Non-fatal problems met along the way (e.g. a failed cache write).
    pub warnings: Vec<String>,
}

pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch `timeframe.intervals_per_month() * months` candles ending at the
    /// current interval boundary.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        months: u32,
    ) -> Result<FetchResult, DataError>;
}

impl<P: MarketDataProvider + ?Sized> MarketDataProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        months: u32,
    ) -> Result<FetchResult, DataError> {
        (**self).fetch(symbol, timeframe, months)
    }
}

/// Number of candles a `(timeframe, months)` request covers.
pub fn expected_len(timeframe: Timeframe, months: u32) -> usize {
    timeframe.intervals_per_month() * months as usize
}

pub(crate) fn check_request(symbol: &str, months: u32) -> Result<(), DataError> {
    if symbol.trim().is_empty() {
        return Err(DataError::InvalidRequest("symbol must not be empty".into()));
    }
    if months == 0 {
        return Err(DataError::InvalidRequest("months must be >= 1".into()));
    }
    Ok(())
}

// ─── Clock ──────────────────────────────────────────────────────────

/// Source of "now" in epoch milliseconds. Injected so cache expiry and
/// synthetic end times are testable.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// Start of the interval containing `now_ms`.
pub fn align_to_interval(now_ms: i64, timeframe: Timeframe) -> i64 {
    let interval = timeframe.interval_ms();
    now_ms.div_euclid(interval) * interval
}
