//! Market data: providers, the time-bounded cache, and the synthetic generator.

pub mod binance;
pub mod cache;
pub mod provider;
pub mod synthetic;

pub use binance::{parse_klines, BinanceProvider};
pub use cache::{cache_key, CacheEntry, CacheStore, CachedProvider, FileStore, MemoryStore};
pub use provider::{
    align_to_interval, expected_len, Clock, DataError, DataSource, FetchResult, FixedClock,
    MarketDataProvider, SystemClock,
};
pub use synthetic::{SyntheticProvider, DEFAULT_BASE_PRICE};
