//! Search result cache keyed by domain, query and retrieval parameters

use crate::error::Result;
use crate::retrieval::ranking::RankedResult;
use crate::retrieval::SearchOptions;
use crate::tenant::normalize_domain;
use crate::text;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Cached, ranked response
pub type CachedResults = Arc<Vec<RankedResult>>;

/// Identity of a cached response
///
/// The domain is normalized, so casing and a `www.` prefix map to the same
/// entry. Everything else that changes the response is folded into a BLAKE3
/// hash of the parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub domain: String,
    pub query: String,
    pub params: String,
}

impl CacheKey {
    pub fn new(domain: &str, query: &str, limit: usize, threshold: f32, options: &SearchOptions) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(limit as u64).to_le_bytes());
        hasher.update(&threshold.to_bits().to_le_bytes());
        match options.budget {
            Some(budget) => {
                hasher.update(&[1]);
                hasher.update(&budget.to_bits().to_le_bytes());
            }
            None => {
                hasher.update(&[0]);
            }
        }
        let weights = serde_json::to_vec(&options.weights).unwrap_or_default();
        hasher.update(&weights);

        Self {
            domain: normalize_domain(domain),
            query: text::collapse_whitespace(query),
            params: hasher.finalize().to_hex().to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.domain, self.query, &self.params[..12.min(self.params.len())])
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub expired: u64,
}

/// Storage for ranked responses
///
/// `get` only reads; callers report the outcome of every lookup through
/// `record_access` so hit accounting works for any backend. A backend that
/// cannot be reached returns `CacheUnavailable`.
#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedResults>>;

    async fn put(&self, key: CacheKey, results: CachedResults) -> Result<()>;

    async fn record_access(&self, key: &CacheKey, hit: bool);

    fn stats(&self) -> SearchCacheStats;
}

struct CacheEntry {
    results: CachedResults,
    inserted_at: Instant,
    access_count: u64,
}

/// Process-local LRU cache with a TTL
pub struct InMemorySearchCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
}

impl InMemorySearchCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Times a live entry has been served
    pub fn access_count(&self, key: &CacheKey) -> Option<u64> {
        self.entries.lock().peek(key).map(|e| e.access_count)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[async_trait]
impl SearchCache for InMemorySearchCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedResults>> {
        let mut entries = self.entries.lock();

        let expired = entries
            .peek(key)
            .map(|e| e.inserted_at.elapsed() >= self.ttl)
            .unwrap_or(false);
        if expired {
            entries.pop(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Search cache entry expired");
            return Ok(None);
        }

        Ok(entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.results.clone()
        }))
    }

    async fn put(&self, key: CacheKey, results: CachedResults) -> Result<()> {
        let entry = CacheEntry {
            results,
            inserted_at: Instant::now(),
            access_count: 0,
        };
        if let Some((evicted, _)) = self.entries.lock().push(key.clone(), entry) {
            if evicted != key {
                debug!(key = %evicted, "Search cache entry evicted");
            }
        }
        Ok(())
    }

    async fn record_access(&self, _key: &CacheKey, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn stats(&self) -> SearchCacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        SearchCacheStats {
            entries: self.len(),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(domain: &str, query: &str) -> CacheKey {
        CacheKey::new(domain, query, 10, 0.2, &SearchOptions::default())
    }

    #[test]
    fn test_key_normalizes_domain_and_query() {
        assert_eq!(key("WWW.Shop.com", "Blue  Pump"), key("shop.com", "blue pump"));
    }

    #[test]
    fn test_key_changes_with_parameters() {
        let base = key("shop.com", "pump");
        assert_ne!(base, CacheKey::new("shop.com", "pump", 11, 0.2, &SearchOptions::default()));
        assert_ne!(base, CacheKey::new("shop.com", "pump", 10, 0.3, &SearchOptions::default()));
        assert_ne!(
            base,
            CacheKey::new("shop.com", "pump", 10, 0.2, &SearchOptions::default().with_budget(100.0))
        );

        let mut options = SearchOptions::default();
        options.weights.price = Some(0.5);
        assert_ne!(base, CacheKey::new("shop.com", "pump", 10, 0.2, &options));
    }

    #[tokio::test]
    async fn test_put_get_counts_access() {
        let cache = InMemorySearchCache::new(4, Duration::from_secs(60));
        let k = key("shop.com", "pump");

        assert!(cache.get(&k).await.unwrap().is_none());
        cache.put(k.clone(), Arc::new(Vec::new())).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_some());
        assert!(cache.get(&k).await.unwrap().is_some());
        assert_eq!(cache.access_count(&k), Some(2));

        cache.record_access(&k, false).await;
        cache.record_access(&k, true).await;
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = InMemorySearchCache::new(4, Duration::from_millis(10));
        let k = key("shop.com", "pump");
        cache.put(k.clone(), Arc::new(Vec::new())).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&k).await.unwrap().is_none());
        assert_eq!(cache.stats().expired, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = InMemorySearchCache::new(2, Duration::from_secs(60));
        for q in ["a", "b", "c"] {
            cache.put(key("shop.com", q), Arc::new(Vec::new())).await.unwrap();
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("shop.com", "a")).await.unwrap().is_none());
    }
}
