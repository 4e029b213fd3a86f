//! Candle interval lengths.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timeframe '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 4h, 1d)")]
pub struct TimeframeError(pub String);

/// Fixed spacing between consecutive candles.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[default]
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 7] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    /// Interval length in milliseconds.
    pub fn interval_ms(&self) -> i64 {
        self.minutes() * 60_000
    }

    /// Candles per 30-day month.
    pub fn intervals_per_month(&self) -> usize {
        match self {
            Timeframe::M1 => 43_200,
            Timeframe::M5 => 8_640,
            Timeframe::M15 => 2_880,
            Timeframe::M30 => 1_440,
            Timeframe::H1 => 720,
            Timeframe::H4 => 180,
            Timeframe::D1 => 30,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str() == s.trim())
            .ok_or_else(|| TimeframeError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_tokens() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.as_str().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn unknown_token_is_error() {
        assert!("2h".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn month_covers_thirty_days() {
        for tf in Timeframe::ALL {
            let minutes = tf.intervals_per_month() as i64 * tf.minutes();
            assert_eq!(minutes, 30 * 24 * 60, "{tf}");
        }
    }

    #[test]
    fn serde_uses_token() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let tf: Timeframe = serde_json::from_str("\"30m\"").unwrap();
        assert_eq!(tf, Timeframe::M30);
    }
}
