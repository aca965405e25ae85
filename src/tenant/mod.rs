//! Domain → tenant resolution with a process-lifetime memo
//!
//! Positive lookups are cached for the lifetime of the resolver. Negative
//! lookups are cached too, bounded by a TTL, so unknown domains do not hit the
//! backing store on every request.

mod store;

pub use store::{DomainStore, SqliteDomainStore, TenantRecord};

use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Opaque merchant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of a storefront domain
///
/// Trims, lower-cases, drops an `http(s)://` scheme, anything after the host
/// (path, query, port), a trailing dot and a leading `www.`.
pub fn normalize_domain(domain: &str) -> String {
    let lower = domain.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let host_end = without_scheme
        .find(['/', '?', '#', ':'])
        .unwrap_or(without_scheme.len());
    let host = without_scheme[..host_end].trim_end_matches('.');
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

#[derive(Debug, Clone)]
enum CachedLookup {
    Found(TenantId),
    Missing { cached_at: Instant },
}

/// Snapshot of resolver counters, for logging only
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolverStats {
    pub cache_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_lookup_ms: f64,
}

/// Memoizing domain resolver
pub struct TenantResolver {
    store: Arc<dyn DomainStore>,
    cache: RwLock<HashMap<String, CachedLookup>>,
    negative_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    lookup_micros: AtomicU64,
}

impl TenantResolver {
    /// Create a resolver over a backing store
    ///
    /// # Arguments
    /// * `store` - Backing domain store
    /// * `negative_ttl` - How long an unknown domain stays cached as unknown
    pub fn new(store: Arc<dyn DomainStore>, negative_ttl: Duration) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            negative_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            lookup_micros: AtomicU64::new(0),
        }
    }

    /// Resolve a public domain to its tenant, `None` when unknown
    ///
    /// Store failures are logged and reported as unknown so callers degrade
    /// to an empty result instead of failing.
    pub async fn resolve(&self, domain: &str) -> Option<TenantId> {
        let normalized = normalize_domain(domain);
        if normalized.is_empty() {
            return None;
        }

        let start = Instant::now();

        if let Some(cached) = self.cached(&normalized) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.record_latency(start);
            tracing::debug!(domain = %normalized, found = cached.is_some(), "Tenant cache hit");
            return cached;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);

        let outcome = match self.store.lookup_tenant(&normalized).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(domain = %normalized, error = %e, "Domain store lookup failed");
                self.record_latency(start);
                // Not cached: the next request retries the store
                return None;
            }
        };

        let entry = match &outcome {
            Some(tenant) => CachedLookup::Found(tenant.clone()),
            None => CachedLookup::Missing {
                cached_at: Instant::now(),
            },
        };
        self.cache.write().insert(normalized, entry);
        self.record_latency(start);

        outcome
    }

    /// Cached outcome: `Some(Some(_))` known, `Some(None)` known-missing, `None` not cached
    fn cached(&self, normalized: &str) -> Option<Option<TenantId>> {
        let cache = self.cache.read();
        match cache.get(normalized)? {
            CachedLookup::Found(tenant) => Some(Some(tenant.clone())),
            CachedLookup::Missing { cached_at } if cached_at.elapsed() < self.negative_ttl => {
                Some(None)
            }
            CachedLookup::Missing { .. } => None,
        }
    }

    fn record_latency(&self, start: Instant) {
        let micros = start.elapsed().as_micros().min(u64::MAX as u128) as u64;
        self.lookup_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Current counters
    pub fn stats(&self) -> ResolverStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let micros = self.lookup_micros.load(Ordering::Relaxed);

        ResolverStats {
            cache_size: self.cache.read().len(),
            hits,
            misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
            avg_lookup_ms: if total == 0 {
                0.0
            } else {
                micros as f64 / total as f64 / 1000.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TenantSearchError};
    use async_trait::async_trait;

    struct MapStore {
        domains: Vec<(&'static str, &'static str)>,
        calls: AtomicU64,
        fail: bool,
    }

    impl MapStore {
        fn new(domains: Vec<(&'static str, &'static str)>) -> Self {
            Self {
                domains,
                calls: AtomicU64::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl DomainStore for MapStore {
        async fn lookup_tenant(&self, domain: &str) -> Result<Option<TenantId>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TenantSearchError::DomainStore("connection refused".into()));
            }
            Ok(self
                .domains
                .iter()
                .find(|(d, _)| *d == domain)
                .map(|(_, id)| TenantId::new(*id)))
        }
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("WWW.Thompsonseparts.co.uk"), "thompsonseparts.co.uk");
        assert_eq!(
            normalize_domain(" https://www.shop.com:8443/cart?x=1 "),
            "shop.com"
        );
        assert_eq!(normalize_domain("shop.com."), "shop.com");
        assert_eq!(normalize_domain(""), "");
    }

    #[tokio::test]
    async fn test_www_prefix_resolves_identically() {
        let store = Arc::new(MapStore::new(vec![("thompsonseparts.co.uk", "t-1")]));
        let resolver = TenantResolver::new(store, Duration::from_secs(60));

        for d in ["thompsonseparts.co.uk", "Thompsonseparts.CO.uk", "unknown.example"] {
            let plain = resolver.resolve(d).await;
            let prefixed = resolver.resolve(&format!("www.{}", d)).await;
            assert_eq!(plain, prefixed, "domain {}", d);
        }
    }

    #[tokio::test]
    async fn test_hits_skip_the_store() {
        let store = Arc::new(MapStore::new(vec![("shop.com", "t-1")]));
        let resolver = TenantResolver::new(store.clone(), Duration::from_secs(60));

        assert_eq!(resolver.resolve("shop.com").await, Some(TenantId::new("t-1")));
        assert_eq!(resolver.resolve("WWW.SHOP.COM").await, Some(TenantId::new("t-1")));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        let stats = resolver.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cache_size, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_negative_results_cached_until_ttl() {
        let store = Arc::new(MapStore::new(vec![]));
        let resolver = TenantResolver::new(store.clone(), Duration::from_millis(30));

        assert_eq!(resolver.resolve("nobody.com").await, None);
        assert_eq!(resolver.resolve("nobody.com").await, None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(resolver.resolve("nobody.com").await, None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_store_errors_degrade_to_not_found() {
        let mut store = MapStore::new(vec![("shop.com", "t-1")]);
        store.fail = true;
        let store = Arc::new(store);
        let resolver = TenantResolver::new(store.clone(), Duration::from_secs(60));

        assert_eq!(resolver.resolve("shop.com").await, None);
        // Failures are not memoized
        assert_eq!(resolver.resolve("shop.com").await, None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_domain_is_not_found() {
        let store = Arc::new(MapStore::new(vec![]));
        let resolver = TenantResolver::new(store.clone(), Duration::from_secs(60));
        assert_eq!(resolver.resolve("   ").await, None);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
