//! Binance spot klines provider.
//!
//! Pages through the public `/api/v3/klines` endpoint (1000 candles per
//! request) for the requested window. Handles rate limiting with retries,
//! exponential backoff and the server's `Retry-After`. Response parsing is a
//! pure function so it can be tested offline.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use super::provider::{
    align_to_interval, check_request, expected_len, system_clock, Clock, DataError, DataSource,
    FetchResult, MarketDataProvider,
};
use crate::domain::{Candle, Timeframe};

pub const BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Maximum klines Binance returns per request.
const PAGE_LIMIT: usize = 1000;

/// Binance error code for an unknown symbol.
const INVALID_SYMBOL: i64 = -1121;

/// `BTC/USDT` → `BTCUSDT`.
pub fn market_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn number(field: &Value, what: &str) -> Result<f64, DataError> {
    match field {
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| DataError::ResponseFormatChanged(format!("{what} '{s}': {e}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("{what} out of range"))),
        other => Err(DataError::ResponseFormatChanged(format!(
            "{what} has unexpected type: {other}"
        ))),
    }
}

/// Parse a klines response body into candles.
///
/// Each kline is `[openTime, open, high, low, close, volume, closeTime, ...]`
/// with prices as decimal strings. An error object (`{"code": .., "msg": ..}`)
/// maps to [`DataError::SymbolNotFound`] for unknown symbols.
pub fn parse_klines(symbol: &str, body: &str) -> Result<Vec<Candle>, DataError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("invalid JSON: {e}")))?;

    let rows = match value {
        Value::Array(rows) => rows,
        Value::Object(obj) => {
            let code = obj.get("code").and_then(Value::as_i64);
            let msg = obj.get("msg").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(if code == Some(INVALID_SYMBOL) {
                DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                }
            } else {
                DataError::Other(format!("binance error {code:?}: {msg}"))
            });
        }
        other => {
            return Err(DataError::ResponseFormatChanged(format!(
                "expected an array, got {other}"
            )))
        }
    };

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let fields = row
            .as_array()
            .filter(|f| f.len() >= 6)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("bad kline row: {row}")))?;
        let time = fields[0]
            .as_i64()
            .ok_or_else(|| DataError::ResponseFormatChanged("open time is not an integer".into()))?;
        candles.push(Candle {
            time,
            open: number(&fields[1], "open")?,
            high: number(&fields[2], "high")?,
            low: number(&fields[3], "low")?,
            close: number(&fields[4], "close")?,
            volume: number(&fields[5], "volume")?,
        });
    }
    Ok(candles)
}

/// Longest wait honoured from a `Retry-After` header.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Wait before retry `attempt` (1-based): exponential backoff from `base`,
/// stretched to the server's `Retry-After` (capped) after a rate limit.
fn retry_delay(base: Duration, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
    let backoff = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    match retry_after_secs {
        Some(secs) => backoff.max(Duration::from_secs(secs).min(MAX_RETRY_AFTER)),
        None => backoff,
    }
}

pub struct BinanceProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
    clock: Arc<dyn Clock>,
}

impl BinanceProvider {
    pub fn new() -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("stratlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: BINANCE_BASE_URL.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            clock: system_clock(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn klines_url(&self, market: &str, timeframe: Timeframe, start: i64, end: i64) -> String {
        format!(
            "{}/api/v3/klines?symbol={market}&interval={}&startTime={start}&endTime={end}&limit={PAGE_LIMIT}",
            self.base_url,
            timeframe.as_str()
        )
    }

    /// One page request with retry.
    fn get_page(&self, symbol: &str, url: &str) -> Result<Vec<Candle>, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let retry_after = match &last_error {
                    Some(DataError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
                    _ => None,
                };
                let delay = retry_delay(self.base_delay, attempt, retry_after);
                debug!(attempt, ?delay, "retrying klines request");
                std::thread::sleep(delay);
            }

            let resp = match self.client.get(url).send() {
                Ok(resp) => resp,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                    continue;
                }
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            let status = resp.status();
            // 418 is Binance's "banned after ignoring 429s"
            if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(symbol, %status, retry_after, "rate limited by binance");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                last_error = Some(DataError::Other(format!("HTTP {status} for {symbol}")));
                continue;
            }

            let body = resp
                .text()
                .map_err(|e| DataError::NetworkUnreachable(format!("reading body: {e}")))?;
            return parse_klines(symbol, &body);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl MarketDataProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        months: u32,
    ) -> Result<FetchResult, DataError> {
        check_request(symbol, months)?;
        let market = market_symbol(symbol);
        let interval = timeframe.interval_ms();
        let count = expected_len(timeframe, months);
        let end = align_to_interval(self.clock.now_ms(), timeframe);
        let start = end - count as i64 * interval;

        let mut candles: Vec<Candle> = Vec::with_capacity(count);
        let mut cursor = start;
        while cursor < end {
            let url = self.klines_url(&market, timeframe, cursor, end - 1);
            let page = self.get_page(symbol, &url)?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.time + interval;
            let full = page.len() >= PAGE_LIMIT;
            candles.extend(page.into_iter().filter(|c| c.time >= start && c.time < end));
            if !full {
                break;
            }
        }

        candles.sort_by_key(|c| c.time);
        candles.dedup_by_key(|c| c.time);

        let mut warnings = Vec::new();
        if candles.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        if candles.len() < count {
            let message = format!(
                "binance returned {} of {count} requested {timeframe} candles for {symbol}",
                candles.len()
            );
            warn!("{message}");
            warnings.push(message);
        }
        debug!(symbol, %timeframe, candles = candles.len(), "fetched binance klines");

        Ok(FetchResult {
            symbol: symbol.to_string(),
            timeframe,
            candles,
            source: DataSource::Binance,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"[
        [1704067200000, "42283.58", "42554.57", "42261.02", "42475.23", "1271.68108", 1704070799999, "53957248.97", 47134, "682.57581", "28957416.82", "0"],
        [1704070800000, "42475.23", "42775.00", "42431.65", "42613.56", "1196.37856", 1704074399999, "50984893.28", 43767, "648.31588", "27631718.31", "0"]
    ]"#;

    #[test]
    fn backoff_doubles_without_rate_limit() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1, None), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 3, None), Duration::from_secs(2));
    }

    #[test]
    fn rate_limit_waits_for_retry_after() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1, Some(5)), Duration::from_secs(5));
        // backoff already longer than the header
        assert_eq!(retry_delay(base, 5, Some(1)), Duration::from_secs(8));
        // header is capped
        assert_eq!(retry_delay(base, 1, Some(3600)), MAX_RETRY_AFTER);
        assert_eq!(retry_delay(base, 1, Some(0)), base);
    }

    #[test]
    fn parses_string_prices() {
        let candles = parse_klines("BTC/USDT", BODY).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].time, 1_704_067_200_000);
        assert_eq!(candles[0].open, 42283.58);
        assert_eq!(candles[1].close, 42613.56);
        assert_eq!(candles[1].volume, 1196.37856);
        assert!(candles.iter().all(|c| c.is_sane()));
    }

    #[test]
    fn invalid_symbol_maps_to_not_found() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        let err = parse_klines("NOPE/USDT", body).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn other_error_objects_surface_message() {
        let err = parse_klines("BTC/USDT", r#"{"code":-1100,"msg":"Illegal characters"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("Illegal characters"));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(parse_klines("BTC/USDT", r#"[[1704067200000, "1.0"]]"#).is_err());
        assert!(parse_klines("BTC/USDT", r#"[[1704067200000, "x", "1", "1", "1", "1"]]"#).is_err());
        assert!(parse_klines("BTC/USDT", "not json").is_err());
    }

    #[test]
    fn market_symbol_strips_separators() {
        assert_eq!(market_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(market_symbol("eth-usdt"), "ETHUSDT");
    }

    #[test]
    fn url_shape() {
        let p = BinanceProvider::new().unwrap().with_base_url("http://localhost:9/");
        assert_eq!(
            p.klines_url("BTCUSDT", Timeframe::H1, 10, 20),
            "http://localhost:9/api/v3/klines?symbol=BTCUSDT&interval=1h&startTime=10&endTime=20&limit=1000"
        );
    }
}
