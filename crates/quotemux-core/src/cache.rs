//! In-memory TTL cache for resolved market data.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{CoreError, DataKind, Symbol};

/// Cache key: symbol, data kind and a request-shape discriminant so that
/// e.g. a 1d/1mo series and a 1wk/1y series of the same symbol coexist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub symbol: Symbol,
    pub kind: DataKind,
    pub variant: String,
}

impl CacheKey {
    pub fn new(symbol: Symbol, kind: DataKind) -> Self {
        Self {
            symbol,
            kind,
            variant: String::new(),
        }
    }

    pub fn with_variant(symbol: Symbol, kind: DataKind, variant: impl Into<String>) -> Self {
        Self {
            symbol,
            kind,
            variant: variant.into(),
        }
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.symbol, self.variant)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: serde_json::Value,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
}

impl CacheInner {
    fn put(&mut self, key: CacheKey, body: serde_json::Value, ttl: Duration) {
        self.map.insert(
            key,
            CacheEntry {
                body,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

/// Thread-safe TTL cache for resolved payloads.
///
/// Entries are evicted lazily: an expired entry is removed when a read
/// finds it stale, and `clear_expired` sweeps the rest on demand.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and decode a fresh entry. A stale entry is removed on the spot
    /// and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        {
            let store = self.inner.read().await;
            match store.map.get(key) {
                None => return None,
                Some(entry) if Instant::now() < entry.expires_at => {
                    return serde_json::from_value(entry.body.clone()).ok();
                }
                Some(_) => {}
            }
        }

        // Stale: upgrade to a write lock and drop it. Re-check expiry since
        // another task may have refreshed the entry in between.
        let mut store = self.inner.write().await;
        if let Some(entry) = store.map.get(key) {
            if Instant::now() < entry.expires_at {
                return serde_json::from_value(entry.body.clone()).ok();
            }
            store.map.remove(key);
        }
        None
    }

    pub async fn put<T: Serialize>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        if ttl == Duration::ZERO {
            return Ok(());
        }

        let body = serde_json::to_value(value)?;
        let mut store = self.inner.write().await;
        store.put(key, body, ttl);
        Ok(())
    }

    pub async fn clear_expired(&self) {
        let now = Instant::now();
        let mut store = self.inner.write().await;
        store.map.retain(|_, entry| entry.expires_at > now);
    }

    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Entry count, expired entries included until swept.
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(symbol: &str, kind: DataKind) -> CacheKey {
        CacheKey::new(Symbol::parse(symbol).expect("valid"), kind)
    }

    #[tokio::test]
    async fn basic_put_get_overwrite() {
        let cache = CacheStore::new();
        let k = key("AAPL", DataKind::Quote);

        assert_eq!(cache.get::<f64>(&k).await, None);

        cache
            .put(k.clone(), &123.0f64, Duration::from_secs(60))
            .await
            .expect("put");
        assert_eq!(cache.get::<f64>(&k).await, Some(123.0));

        cache
            .put(k.clone(), &124.0f64, Duration::from_secs(60))
            .await
            .expect("put");
        assert_eq!(cache.get::<f64>(&k).await, Some(124.0));
    }

    #[tokio::test]
    async fn expired_entry_is_evicted_on_read() {
        let cache = CacheStore::new();
        let k = key("AAPL", DataKind::Quote);

        cache
            .put(k.clone(), &1.0f64, Duration::from_millis(20))
            .await
            .expect("put");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get::<f64>(&k).await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn variants_of_same_symbol_coexist() {
        let cache = CacheStore::new();
        let sym = Symbol::parse("AAPL").expect("valid");
        let daily = CacheKey::with_variant(sym.clone(), DataKind::Series, "1d:1mo");
        let weekly = CacheKey::with_variant(sym, DataKind::Series, "1wk:1y");

        cache
            .put(daily.clone(), &"daily", Duration::from_secs(60))
            .await
            .expect("put");
        cache
            .put(weekly.clone(), &"weekly", Duration::from_secs(60))
            .await
            .expect("put");

        assert_eq!(cache.get::<String>(&daily).await.as_deref(), Some("daily"));
        assert_eq!(
            cache.get::<String>(&weekly).await.as_deref(),
            Some("weekly")
        );
    }

    #[tokio::test]
    async fn zero_ttl_is_a_no_op() {
        let cache = CacheStore::new();
        let k = key("AAPL", DataKind::Quote);

        cache
            .put(k.clone(), &1.0f64, Duration::ZERO)
            .await
            .expect("put");
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clear_expired_sweeps_stale_entries() {
        let cache = CacheStore::new();

        cache
            .put(key("AAPL", DataKind::Quote), &1.0f64, Duration::from_millis(20))
            .await
            .expect("put");
        cache
            .put(key("MSFT", DataKind::Quote), &2.0f64, Duration::from_secs(60))
            .await
            .expect("put");

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.clear_expired().await;
        assert_eq!(cache.len().await, 1);
    }
}
