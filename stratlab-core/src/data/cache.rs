//! Time-bounded candle cache.
//!
//! Entries are keyed by `"<symbol>_<timeframe>"` and hold `{data, timestamp}`.
//! An entry younger than the TTL is returned unmodified; anything else (miss,
//! expired, unreadable) falls through to the wrapped provider and the fresh
//! series is written back. Cache I/O problems never fail a fetch.
//!
//! Stores:
//! - [`FileStore`]: one JSON file per key, atomic writes (write `.tmp`, rename)
//! - [`MemoryStore`]: in-process map
//!
//! Concurrent writers of the same key are last-write-wins in both stores.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::{
    check_request, system_clock, Clock, DataError, DataSource, FetchResult, MarketDataProvider,
};
use crate::domain::{Candle, Timeframe};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Persisted form of one cached series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data: Vec<Candle>,
    /// Epoch milliseconds when the entry was written.
    pub timestamp: i64,
}

impl CacheEntry {
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp
    }
}

pub fn cache_key(symbol: &str, timeframe: Timeframe) -> String {
    format!("{symbol}_{timeframe}")
}

/// Key-value persistence behind [`CachedProvider`].
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, DataError>;

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), DataError>;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>, DataError>;

    /// Remove every entry; returns how many were removed.
    fn clear(&self) -> Result<usize, DataError>;
}

impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, DataError> {
        (**self).get(key)
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), DataError> {
        (**self).put(key, entry)
    }

    fn keys(&self) -> Result<Vec<String>, DataError> {
        (**self).keys()
    }

    fn clear(&self) -> Result<usize, DataError> {
        (**self).clear()
    }
}

// ─── FileStore ──────────────────────────────────────────────────────

/// Keys are percent-encoded into file names: `BTC/USDT_5m` → `BTC%2FUSDT_5m.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_key(key)))
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn decode_key(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl CacheStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, DataError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DataError::CacheError(format!(
                    "read {}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| DataError::CacheError(format!("corrupt entry {}: {e}", path.display())))
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), DataError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| DataError::CacheError(format!("failed to create dir: {e}")))?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let json = serde_json::to_vec(entry)
            .map_err(|e| DataError::CacheError(format!("serialization: {e}")))?;
        fs::write(&tmp_path, json)
            .map_err(|e| DataError::CacheError(format!("write {}: {e}", tmp_path.display())))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            DataError::CacheError(format!("atomic rename failed: {e}"))
        })
    }

    fn keys(&self) -> Result<Vec<String>, DataError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DataError::CacheError(format!("read dir: {e}"))),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| DataError::CacheError(format!("dir entry: {e}")))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Some(key) = decode_key(stem) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<usize, DataError> {
        let keys = self.keys()?;
        for key in &keys {
            let path = self.path_for(key);
            fs::remove_file(&path)
                .map_err(|e| DataError::CacheError(format!("remove {}: {e}", path.display())))?;
        }
        Ok(keys.len())
    }
}

// ─── MemoryStore ────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DataError {
    DataError::CacheError("memory store lock poisoned".into())
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, DataError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, entry: &CacheEntry) -> Result<(), DataError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, DataError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn clear(&self) -> Result<usize, DataError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let n = entries.len();
        entries.clear();
        Ok(n)
    }
}

// ─── CachedProvider ─────────────────────────────────────────────────

pub struct CachedProvider<P, S> {
    inner: P,
    store: S,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<P: MarketDataProvider, S: CacheStore> CachedProvider<P, S> {
    pub fn new(inner: P, store: S) -> Self {
        Self {
            inner,
            store,
            ttl: DEFAULT_TTL,
            clock: system_clock(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl<P: MarketDataProvider, S: CacheStore> MarketDataProvider for CachedProvider<P, S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        months: u32,
    ) -> Result<FetchResult, DataError> {
        check_request(symbol, months)?;
        let key = cache_key(symbol, timeframe);
        let mut warnings = Vec::new();

        match self.store.get(&key) {
            Ok(Some(entry)) => {
                let age = entry.age_ms(self.clock.now_ms());
                if age < self.ttl_ms() {
                    debug!(key, age_ms = age, candles = entry.data.len(), "cache hit");
                    return Ok(FetchResult {
                        symbol: symbol.to_string(),
                        timeframe,
                        candles: entry.data,
                        source: DataSource::Cache,
                        warnings,
                    });
                }
                debug!(key, age_ms = age, "cache entry expired");
            }
            Ok(None) => debug!(key, "cache miss"),
            Err(e) => {
                let message = format!("cache read failed for {key}: {e}");
                warn!("{message}");
                warnings.push(message);
            }
        }

        let mut result = self.inner.fetch(symbol, timeframe, months)?;
        let entry = CacheEntry {
            data: result.candles.clone(),
            timestamp: self.clock.now_ms(),
        };
        if let Err(e) = self.store.put(&key, &entry) {
            let message = format!("cache write failed for {key}: {e}");
            warn!("{message}");
            warnings.push(message);
        }

        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FixedClock, SyntheticProvider};
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_cache_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "stratlab_cache_test_{}_{id}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    const NOW: i64 = 1_704_067_200_000;

    /// Counts inner fetches.
    struct Counting {
        inner: SyntheticProvider,
        calls: AtomicUsize,
    }

    impl Counting {
        fn new() -> Self {
            Self {
                inner: SyntheticProvider::default().with_clock(Arc::new(FixedClock(NOW))),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl MarketDataProvider for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch(
            &self,
            symbol: &str,
            timeframe: Timeframe,
            months: u32,
        ) -> Result<FetchResult, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(symbol, timeframe, months)
        }
    }

    struct BrokenStore;

    impl CacheStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<CacheEntry>, DataError> {
            Err(DataError::CacheError("disk on fire".into()))
        }
        fn put(&self, _key: &str, _entry: &CacheEntry) -> Result<(), DataError> {
            Err(DataError::CacheError("disk on fire".into()))
        }
        fn keys(&self) -> Result<Vec<String>, DataError> {
            Ok(Vec::new())
        }
        fn clear(&self) -> Result<usize, DataError> {
            Ok(0)
        }
    }

    #[test]
    fn key_encoding_round_trips() {
        let key = cache_key("BTC/USDT", Timeframe::M5);
        assert_eq!(key, "BTC/USDT_5m");
        assert_eq!(encode_key(&key), "BTC%2FUSDT_5m");
        assert_eq!(decode_key(&encode_key(&key)).as_deref(), Some(key.as_str()));
    }

    #[test]
    fn second_fetch_within_ttl_is_a_hit() {
        let provider = CachedProvider::new(Counting::new(), MemoryStore::new())
            .with_clock(Arc::new(FixedClock(NOW)));

        let first = provider.fetch("BTC/USDT", Timeframe::H4, 1).unwrap();
        let second = provider.fetch("BTC/USDT", Timeframe::H4, 1).unwrap();
        assert_eq!(first.source, DataSource::Synthetic);
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(first.candles, second.candles);
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn expired_entry_is_refetched() {
        let store = Arc::new(MemoryStore::new());
        let stale = CacheEntry {
            data: Vec::new(),
            timestamp: NOW - DEFAULT_TTL.as_millis() as i64,
        };
        store.put(&cache_key("BTC/USDT", Timeframe::D1), &stale).unwrap();

        let provider = CachedProvider::new(Counting::new(), Arc::clone(&store))
            .with_clock(Arc::new(FixedClock(NOW)));
        let r = provider.fetch("BTC/USDT", Timeframe::D1, 1).unwrap();
        assert_eq!(r.candles.len(), 30);
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);

        let refreshed = store.get("BTC/USDT_1d").unwrap().unwrap();
        assert_eq!(refreshed.timestamp, NOW);
        assert_eq!(refreshed.data.len(), 30);
    }

    #[test]
    fn hit_returns_cached_series_unmodified() {
        let store = MemoryStore::new();
        let cached = CacheEntry {
            data: vec![Candle {
                time: 1,
                open: 1.0,
                high: 2.0,
                low: 0.5,
                close: 1.5,
                volume: 3.0,
            }],
            timestamp: NOW - 1000,
        };
        store.put("BTC/USDT_5m", &cached).unwrap();

        let provider =
            CachedProvider::new(Counting::new(), store).with_clock(Arc::new(FixedClock(NOW)));
        let r = provider.fetch("BTC/USDT", Timeframe::M5, 3).unwrap();
        assert_eq!(r.candles, cached.data);
    }

    #[test]
    fn broken_store_is_a_warning_not_an_error() {
        let provider =
            CachedProvider::new(Counting::new(), BrokenStore).with_clock(Arc::new(FixedClock(NOW)));
        let r = provider.fetch("BTC/USDT", Timeframe::D1, 1).unwrap();
        assert_eq!(r.candles.len(), 30);
        assert_eq!(r.warnings.len(), 2);
        assert!(r.warnings[0].contains("read failed"));
        assert!(r.warnings[1].contains("write failed"));
    }

    #[test]
    fn file_store_round_trip_and_clear() {
        let dir = temp_cache_dir();
        let store = FileStore::new(&dir);
        assert!(store.keys().unwrap().is_empty());
        assert!(store.get("BTC/USDT_5m").unwrap().is_none());

        let entry = CacheEntry {
            data: SyntheticProvider::default()
                .with_clock(Arc::new(FixedClock(NOW)))
                .fetch("BTC/USDT", Timeframe::D1, 1)
                .unwrap()
                .candles,
            timestamp: NOW,
        };
        store.put("BTC/USDT_1d", &entry).unwrap();
        store.put("ETH/USDT_1d", &entry).unwrap();

        assert!(store.path_for("BTC/USDT_1d").exists());
        assert!(!dir.join("BTC%2FUSDT_1d.json.tmp").exists());
        let loaded = store.get("BTC/USDT_1d").unwrap().unwrap();
        assert_eq!(loaded.timestamp, NOW);
        assert_eq!(loaded.data.len(), entry.data.len());
        assert_eq!(loaded.data[5].time, entry.data[5].time);
        assert!((loaded.data[5].close - entry.data[5].close).abs() < 1e-6);
        assert_eq!(store.keys().unwrap(), vec!["BTC/USDT_1d", "ETH/USDT_1d"]);

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.keys().unwrap().is_empty());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_file_is_reported_then_overwritten() {
        let dir = temp_cache_dir();
        let store = FileStore::new(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(store.path_for("BTC/USDT_1d"), "{ not json").unwrap();
        assert!(store.get("BTC/USDT_1d").is_err());

        let provider =
            CachedProvider::new(Counting::new(), store).with_clock(Arc::new(FixedClock(NOW)));
        let r = provider.fetch("BTC/USDT", Timeframe::D1, 1).unwrap();
        assert_eq!(r.warnings.len(), 1);
        assert!(provider.store().get("BTC/USDT_1d").unwrap().is_some());
        let _ = fs::remove_dir_all(&dir);
    }
}
