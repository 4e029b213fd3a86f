//! Candle — the fundamental market data unit.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// OHLCV candle for one interval. `time` is the interval open in epoch milliseconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Returns true if any OHLCV field is NaN (void candle).
    pub fn is_void(&self) -> bool {
        self.open.is_nan()
            || self.high.is_nan()
            || self.low.is_nan()
            || self.close.is_nan()
            || self.volume.is_nan()
    }

    /// Basic OHLC sanity check: high bounds the body, low bounds the body, prices positive.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }

    /// Price or volume column by its conventional dataframe name.
    pub fn column(&self, name: &str) -> Option<f64> {
        match name {
            "open" => Some(self.open),
            "high" => Some(self.high),
            "low" => Some(self.low),
            "close" => Some(self.close),
            "volume" => Some(self.volume),
            _ => None,
        }
    }

    /// `YYYY-MM-DD HH:MM:SS` in UTC, as used in simulation log lines.
    pub fn timestamp_label(&self) -> String {
        format_timestamp(self.time)
    }
}

/// Format epoch milliseconds as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn format_timestamp(epoch_ms: i64) -> String {
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("@{epoch_ms}"),
    }
}
