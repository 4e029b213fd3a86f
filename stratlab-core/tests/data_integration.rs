//! Market data through the file-backed cache.

use std::sync::Arc;
use std::time::Duration;

use stratlab_core::data::{
    cache_key, CacheStore, CachedProvider, DataError, DataSource, FileStore, FixedClock,
    MarketDataProvider, SyntheticProvider,
};
use stratlab_core::Timeframe;

const NOW: i64 = 1_717_200_000_000;

fn provider_at(dir: &std::path::Path, now: i64) -> CachedProvider<SyntheticProvider, FileStore> {
    let clock = Arc::new(FixedClock(now));
    CachedProvider::new(
        SyntheticProvider::default().with_clock(clock.clone()),
        FileStore::new(dir),
    )
    .with_clock(clock)
}

#[test]
fn cache_survives_a_new_provider_instance() {
    let dir = tempfile::tempdir().unwrap();

    let first = provider_at(dir.path(), NOW)
        .fetch("BTC/USDT", Timeframe::H1, 1)
        .unwrap();
    assert_eq!(first.source, DataSource::Synthetic);
    assert_eq!(first.candles.len(), 720);

    // A fresh provider over the same directory, one hour later
    let second = provider_at(dir.path(), NOW + 3_600_000)
        .fetch("BTC/USDT", Timeframe::H1, 1)
        .unwrap();
    assert_eq!(second.source, DataSource::Cache);
    assert_eq!(second.candles.len(), first.candles.len());
    assert_eq!(second.candles[0].time, first.candles[0].time);
    for (a, b) in first.candles.iter().zip(&second.candles) {
        assert!((a.close - b.close).abs() <= a.close * 1e-12);
    }
}

#[test]
fn stale_file_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    provider_at(dir.path(), NOW)
        .fetch("ETH/USDT", Timeframe::D1, 2)
        .unwrap();

    let later = NOW + 2 * 24 * 3_600_000;
    let refreshed = provider_at(dir.path(), later)
        .with_ttl(Duration::from_secs(24 * 3600))
        .fetch("ETH/USDT", Timeframe::D1, 2)
        .unwrap();
    assert_eq!(refreshed.source, DataSource::Synthetic);

    let store = FileStore::new(dir.path());
    let entry = store
        .get(&cache_key("ETH/USDT", Timeframe::D1))
        .unwrap()
        .unwrap();
    assert_eq!(entry.timestamp, later);
}

#[test]
fn keys_are_listed_and_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider_at(dir.path(), NOW);
    provider.fetch("BTC/USDT", Timeframe::M15, 1).unwrap();
    provider.fetch("SOL/USDT", Timeframe::H4, 1).unwrap();

    let store = provider.store();
    assert_eq!(
        store.keys().unwrap(),
        vec!["BTC/USDT_15m".to_string(), "SOL/USDT_4h".to_string()]
    );
    assert_eq!(store.clear().unwrap(), 2);
    assert!(store.keys().unwrap().is_empty());
}

#[test]
fn invalid_requests_never_touch_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let provider = provider_at(dir.path(), NOW);

    let err = provider.fetch("", Timeframe::H1, 1).unwrap_err();
    assert!(matches!(err, DataError::InvalidRequest(_)));
    let err = provider.fetch("BTC/USDT", Timeframe::H1, 0).unwrap_err();
    assert!(matches!(err, DataError::InvalidRequest(_)));

    assert!(provider.store().keys().unwrap().is_empty());
}

#[test]
fn synthetic_walk_is_reproducible_across_instances() {
    let a = SyntheticProvider::default()
        .with_clock(Arc::new(FixedClock(NOW)))
        .fetch("BTC/USDT", Timeframe::M5, 1)
        .unwrap();
    let b = SyntheticProvider::default()
        .with_clock(Arc::new(FixedClock(NOW)))
        .fetch("BTC/USDT", Timeframe::M5, 1)
        .unwrap();
    assert_eq!(a.candles, b.candles);

    let other = SyntheticProvider::default()
        .with_clock(Arc::new(FixedClock(NOW)))
        .fetch("ETH/USDT", Timeframe::M5, 1)
        .unwrap();
    assert_ne!(a.candles[0].close, other.candles[0].close);
}
