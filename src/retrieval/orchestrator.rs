//! Search orchestration: cache, tenant resolution, strategy chain,
//! consolidation and ranking

use crate::catalog::{Catalog, Product, TenantCatalog};
use crate::error::{Result, TenantSearchError};
use crate::retrieval::cache::{CacheKey, InMemorySearchCache, SearchCache};
use crate::retrieval::consolidate::{consolidate, EnrichedProduct};
use crate::retrieval::ranking::{RankOptions, RankedResult, Ranker};
use crate::retrieval::strategy::{SearchStrategy, StrategyOutcome};
use crate::retrieval::{ContentCandidate, SearchMethod, SearchOptions, SearchQuery};
use crate::tenant::{normalize_domain, TenantId, TenantResolver};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest result count a single search may ask for
pub const MAX_LIMIT: usize = 1000;

const DEFAULT_CACHE_CAPACITY: usize = 1000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Cache,
    Computed,
    /// The domain resolved to no tenant; results are empty
    DomainNotFound,
}

/// What one tier did during a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    NotApplicable,
    Found,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub method: SearchMethod,
    pub status: StrategyStatus,
    /// Candidates returned by the tier
    pub candidates: usize,
    /// Candidates the tier added to the pool
    pub added: usize,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results plus how they were produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<RankedResult>,
    pub source: ResponseSource,
    pub strategies_run: Vec<StrategyReport>,
}

/// Entry point for domain-scoped search
pub struct SearchOrchestrator {
    resolver: Arc<TenantResolver>,
    strategies: Vec<Arc<dyn SearchStrategy>>,
    cache: Arc<dyn SearchCache>,
    catalog: Arc<Catalog>,
    ranker: Ranker,
}

impl SearchOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Ranked results for `query` within the tenant owning `domain`
    ///
    /// Only malformed input is an error. Unknown domains, failing strategies
    /// and an unreachable cache all degrade to fewer (or no) results.
    pub async fn search(
        &self,
        domain: &str,
        query: &str,
        limit: usize,
        threshold: f32,
        options: &SearchOptions,
    ) -> Result<Vec<RankedResult>> {
        Ok(self
            .search_detailed(domain, query, limit, threshold, options)
            .await?
            .results)
    }

    /// Like [`search`](Self::search), also reporting the response source and
    /// the strategies executed
    pub async fn search_detailed(
        &self,
        domain: &str,
        query: &str,
        limit: usize,
        threshold: f32,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        let start = Instant::now();
        validate(domain, query, limit, threshold, options)?;

        let key = CacheKey::new(domain, query, limit, threshold, options);
        if let Some(results) = self.cached(&key).await {
            let stats = self.cache.stats();
            info!(
                domain = %key.domain,
                results = results.len(),
                cache_hits = stats.hits,
                cache_hit_rate = stats.hit_rate,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Search served from cache"
            );
            return Ok(SearchOutcome {
                results,
                source: ResponseSource::Cache,
                strategies_run: Vec::new(),
            });
        }

        let Some(tenant) = self.resolver.resolve(domain).await else {
            let stats = self.resolver.stats();
            info!(
                domain = %key.domain,
                resolver_hits = stats.hits,
                resolver_misses = stats.misses,
                "Domain not registered, returning no results"
            );
            return Ok(SearchOutcome {
                results: Vec::new(),
                source: ResponseSource::DomainNotFound,
                strategies_run: Vec::new(),
            });
        };
        debug!(domain = %key.domain, tenant = %tenant, "Domain resolved");

        let search_query = SearchQuery::new(query, limit, threshold);
        let (candidates, strategies_run) = self.run_chain(&tenant, &search_query).await;

        let snapshot = self.catalog.snapshot(&tenant);
        let (products, content) = split_candidates(candidates, &snapshot);
        let consolidation = consolidate(products, content);
        debug!(
            tenant = %tenant,
            products = consolidation.enriched_products.len(),
            content = consolidation.unique_content.len(),
            "Candidates consolidated"
        );

        let rank_options = RankOptions {
            budget: options.budget,
            weights: options.weights.clone(),
            now: Utc::now(),
        };
        let mut results = self
            .ranker
            .rank(&search_query.text, consolidation.into(), &rank_options);
        results.truncate(limit);

        if let Err(e) = self.cache.put(key.clone(), Arc::new(results.clone())).await {
            warn!(domain = %key.domain, error = %e, "Failed to write search cache");
        }

        info!(
            domain = %key.domain,
            tenant = %tenant,
            results = results.len(),
            strategies = strategies_run.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(SearchOutcome {
            results,
            source: ResponseSource::Computed,
            strategies_run,
        })
    }

    /// Cache lookup; backend failures count as a miss
    async fn cached(&self, key: &CacheKey) -> Option<Vec<RankedResult>> {
        let found = match self.cache.get(key).await {
            Ok(found) => found,
            Err(e) => {
                warn!(domain = %key.domain, error = %e, "Search cache unavailable, treating as miss");
                None
            }
        };
        self.cache.record_access(key, found.is_some()).await;
        debug!(key = %key, hit = found.is_some(), "Search cache lookup");
        found.map(|results| results.as_ref().clone())
    }

    /// Run tiers in order until enough distinct candidates are pooled
    async fn run_chain(
        &self,
        tenant: &TenantId,
        query: &SearchQuery,
    ) -> (Vec<ContentCandidate>, Vec<StrategyReport>) {
        let mut pool: Vec<ContentCandidate> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut reports = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let method = strategy.method();
            let start = Instant::now();
            let outcome = strategy.search(tenant, query).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let report = match outcome {
                Ok(StrategyOutcome::NotApplicable) => {
                    debug!(tenant = %tenant, strategy = %method, "Strategy not applicable");
                    StrategyReport {
                        method,
                        status: StrategyStatus::NotApplicable,
                        candidates: 0,
                        added: 0,
                        elapsed_ms,
                        error: None,
                    }
                }
                Ok(StrategyOutcome::Found(found)) => {
                    let candidates = found.len();
                    let added = merge_into_pool(&mut pool, &mut positions, found, method);
                    info!(
                        tenant = %tenant,
                        strategy = %method,
                        candidates,
                        added,
                        pooled = pool.len(),
                        elapsed_ms,
                        "Strategy completed"
                    );
                    StrategyReport {
                        method,
                        status: StrategyStatus::Found,
                        candidates,
                        added,
                        elapsed_ms,
                        error: None,
                    }
                }
                Err(e) => {
                    let error = TenantSearchError::strategy(method.as_str(), e.to_string());
                    warn!(tenant = %tenant, strategy = %method, error = %error, elapsed_ms, "Strategy failed");
                    StrategyReport {
                        method,
                        status: StrategyStatus::Failed,
                        candidates: 0,
                        added: 0,
                        elapsed_ms,
                        error: Some(error.to_string()),
                    }
                }
            };
            reports.push(report);

            if pool.len() >= query.limit {
                debug!(tenant = %tenant, pooled = pool.len(), limit = query.limit, "Enough candidates, stopping chain");
                break;
            }
        }

        (pool, reports)
    }
}

/// Append new candidates; items already pooled only gain the new source
fn merge_into_pool(
    pool: &mut Vec<ContentCandidate>,
    positions: &mut HashMap<String, usize>,
    found: Vec<ContentCandidate>,
    method: SearchMethod,
) -> usize {
    let mut added = 0;
    for mut candidate in found {
        let key = candidate.identity_key();
        match positions.get(&key) {
            Some(&index) => pool[index].add_source(method),
            None => {
                candidate.add_source(method);
                positions.insert(key, pool.len());
                pool.push(candidate);
                added += 1;
            }
        }
    }
    added
}

/// Product hits become catalog products; everything else is content
fn split_candidates(
    candidates: Vec<ContentCandidate>,
    snapshot: &TenantCatalog,
) -> (Vec<EnrichedProduct>, Vec<ContentCandidate>) {
    let mut products = Vec::new();
    let mut content = Vec::new();

    for candidate in candidates {
        let Some(product_id) = candidate.product_id.clone().filter(|_| candidate.is_product()) else {
            content.push(candidate);
            continue;
        };
        let product = snapshot.product(&product_id).cloned().unwrap_or_else(|| {
            let mut product = Product::new(product_id, candidate.title.clone());
            if !candidate.url.is_empty() {
                product.permalink = Some(candidate.url.clone());
            }
            product
        });
        products.push(EnrichedProduct::new(
            product,
            candidate.similarity,
            candidate.sources,
        ));
    }

    (products, content)
}

fn validate(domain: &str, query: &str, limit: usize, threshold: f32, options: &SearchOptions) -> Result<()> {
    if normalize_domain(domain).is_empty() {
        return Err(TenantSearchError::InvalidQuery("Domain cannot be empty".to_string()));
    }
    if query.trim().is_empty() {
        return Err(TenantSearchError::InvalidQuery("Query text cannot be empty".to_string()));
    }
    if limit == 0 {
        return Err(TenantSearchError::InvalidQuery("Limit must be at least 1".to_string()));
    }
    if limit > MAX_LIMIT {
        return Err(TenantSearchError::InvalidQuery(format!(
            "Limit must be at most {}, got {}",
            MAX_LIMIT, limit
        )));
    }
    if !(0.0..=1.0).contains(&threshold) {
        return Err(TenantSearchError::InvalidQuery(format!(
            "Threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    if let Some(budget) = options.budget {
        if !budget.is_finite() || budget <= 0.0 {
            return Err(TenantSearchError::InvalidQuery(format!(
                "Budget must be a positive number, got {}",
                budget
            )));
        }
    }
    Ok(())
}

/// Wires an orchestrator from its collaborators
#[derive(Default)]
pub struct OrchestratorBuilder {
    resolver: Option<Arc<TenantResolver>>,
    strategies: Vec<Arc<dyn SearchStrategy>>,
    cache: Option<Arc<dyn SearchCache>>,
    catalog: Option<Arc<Catalog>>,
    ranker: Option<Ranker>,
}

impl OrchestratorBuilder {
    pub fn resolver(mut self, resolver: Arc<TenantResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Append a tier; tiers run in the order added
    pub fn strategy(mut self, strategy: Arc<dyn SearchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn ranker(mut self, ranker: Ranker) -> Self {
        self.ranker = Some(ranker);
        self
    }

    pub fn build(self) -> Result<SearchOrchestrator> {
        let resolver = self
            .resolver
            .ok_or_else(|| TenantSearchError::Config("Orchestrator needs a tenant resolver".to_string()))?;
        if self.strategies.is_empty() {
            return Err(TenantSearchError::Config(
                "Orchestrator needs at least one search strategy".to_string(),
            ));
        }

        Ok(SearchOrchestrator {
            resolver,
            strategies: self.strategies,
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemorySearchCache::new(DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL))),
            catalog: self.catalog.unwrap_or_default(),
            ranker: self.ranker.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cache::{CachedResults, SearchCacheStats};
    use crate::retrieval::ranking::ResultItem;
    use crate::tenant::DomainStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneTenant;

    #[async_trait]
    impl DomainStore for OneTenant {
        async fn lookup_tenant(&self, domain: &str) -> Result<Option<TenantId>> {
            Ok((domain == "shop.com").then(|| TenantId::new("t1")))
        }
    }

    /// Returns a fixed list and counts its calls
    struct Fixed {
        method: SearchMethod,
        items: Vec<ContentCandidate>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(method: SearchMethod, items: Vec<ContentCandidate>) -> Arc<Self> {
            Arc::new(Self {
                method,
                items,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchStrategy for Fixed {
        fn method(&self) -> SearchMethod {
            self.method
        }

        async fn search(&self, _tenant: &TenantId, _query: &SearchQuery) -> Result<StrategyOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StrategyOutcome::Found(self.items.clone()))
        }
    }

    struct Failing(SearchMethod);

    #[async_trait]
    impl SearchStrategy for Failing {
        fn method(&self) -> SearchMethod {
            self.0
        }

        async fn search(&self, _tenant: &TenantId, _query: &SearchQuery) -> Result<StrategyOutcome> {
            Err(TenantSearchError::DomainStore("index offline".to_string()))
        }
    }

    fn page(id: &str, similarity: f32) -> ContentCandidate {
        ContentCandidate::page(id, id, format!("https://shop.com/{}", id), "", Some(0))
            .with_similarity(similarity)
    }

    fn resolver() -> Arc<TenantResolver> {
        Arc::new(TenantResolver::new(Arc::new(OneTenant), Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_invalid_input_rejected() {
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(Fixed::new(SearchMethod::Keyword, vec![]))
            .build()
            .unwrap();
        let options = SearchOptions::default();

        for (domain, query, limit, threshold) in [
            ("", "pump", 5, 0.2),
            ("shop.com", "   ", 5, 0.2),
            ("shop.com", "pump", 0, 0.2),
            ("shop.com", "pump", MAX_LIMIT + 1, 0.2),
            ("shop.com", "pump", usize::MAX, 0.2),
            ("shop.com", "pump", 5, 1.5),
            ("shop.com", "pump", 5, f32::NAN),
        ] {
            let result = orchestrator.search(domain, query, limit, threshold, &options).await;
            assert!(matches!(result, Err(TenantSearchError::InvalidQuery(_))));
        }

        let result = orchestrator
            .search("shop.com", "pump", 5, 0.2, &SearchOptions::default().with_budget(-1.0))
            .await;
        assert!(matches!(result, Err(TenantSearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_chain_short_circuits_once_limit_reached() {
        let keyword = Fixed::new(SearchMethod::Keyword, vec![page("a", 0.9), page("b", 0.8)]);
        let vector = Fixed::new(SearchMethod::Vector, vec![page("c", 0.7)]);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(keyword.clone())
            .strategy(vector.clone())
            .build()
            .unwrap();

        let outcome = orchestrator
            .search_detailed("shop.com", "pump", 2, 0.1, &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.strategies_run.len(), 1);
        assert_eq!(vector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_tier_adds_source_not_duplicate() {
        let keyword = Fixed::new(SearchMethod::Keyword, vec![page("a", 0.9)]);
        let vector = Fixed::new(SearchMethod::Vector, vec![page("a", 0.95), page("b", 0.5)]);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(keyword)
            .strategy(vector)
            .build()
            .unwrap();

        let results = orchestrator
            .search("shop.com", "pump", 10, 0.1, &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let a = results
            .iter()
            .find(|r| r.item.url() == Some("https://shop.com/a"))
            .unwrap();
        assert_eq!(a.item.sources(), &[SearchMethod::Keyword, SearchMethod::Vector]);
        assert!((a.item.similarity() - 0.9).abs() < 1e-6);
        assert!((a.signals.agreement_bonus - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_tier_does_not_fail_search() {
        let fallback = Fixed::new(SearchMethod::Fallback, vec![page("a", 0.3)]);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(Arc::new(Failing(SearchMethod::Keyword)))
            .strategy(fallback)
            .build()
            .unwrap();

        let outcome = orchestrator
            .search_detailed("shop.com", "pump", 5, 0.2, &SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.strategies_run[0].status, StrategyStatus::Failed);
        assert!(outcome.strategies_run[0].error.is_some());
        assert_eq!(outcome.strategies_run[1].status, StrategyStatus::Found);
    }

    /// Cache backend that is never reachable
    struct Unreachable {
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl SearchCache for Unreachable {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CachedResults>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            Err(TenantSearchError::CacheUnavailable("connection refused".to_string()))
        }

        async fn put(&self, _key: CacheKey, _results: CachedResults) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            Err(TenantSearchError::CacheUnavailable("connection refused".to_string()))
        }

        async fn record_access(&self, _key: &CacheKey, _hit: bool) {}

        fn stats(&self) -> SearchCacheStats {
            SearchCacheStats {
                entries: 0,
                hits: 0,
                misses: 0,
                hit_rate: 0.0,
                expired: 0,
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_cache_computes_every_time() {
        let cache = Arc::new(Unreachable {
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        });
        let keyword = Fixed::new(SearchMethod::Keyword, vec![page("a", 0.9)]);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(keyword.clone())
            .cache(cache.clone())
            .build()
            .unwrap();
        let options = SearchOptions::default();

        for round in 1..=2 {
            let outcome = orchestrator
                .search_detailed("shop.com", "pump", 5, 0.1, &options)
                .await
                .unwrap();
            assert_eq!(outcome.source, ResponseSource::Computed);
            assert_eq!(outcome.results.len(), 1);
            assert_eq!(keyword.calls.load(Ordering::SeqCst), round);
        }
        assert_eq!(cache.gets.load(Ordering::SeqCst), 2);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_domain_is_empty_not_error() {
        let keyword = Fixed::new(SearchMethod::Keyword, vec![page("a", 0.9)]);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(keyword.clone())
            .build()
            .unwrap();

        let outcome = orchestrator
            .search_detailed("unknown.com", "pump", 5, 0.2, &SearchOptions::default())
            .await
            .unwrap();

        assert!(outcome.results.is_empty());
        assert_eq!(outcome.source, ResponseSource::DomainNotFound);
        assert_eq!(keyword.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_product_hits_hydrated_from_catalog() {
        let catalog = Arc::new(Catalog::new());
        let mut pump = Product::new("p1", "Hydraulic Pump");
        pump.price = Some(99.0);
        catalog.register(
            TenantId::new("t1"),
            TenantCatalog {
                products: vec![pump],
                pages: vec![],
            },
        );
        let hit = ContentCandidate::product("p1", "Hydraulic Pump", "", "").with_similarity(0.8);
        let orchestrator = SearchOrchestrator::builder()
            .resolver(resolver())
            .strategy(Fixed::new(SearchMethod::Vector, vec![hit]))
            .catalog(catalog)
            .build()
            .unwrap();

        let results = orchestrator
            .search("shop.com", "pump", 5, 0.2, &SearchOptions::default().with_budget(100.0))
            .await
            .unwrap();

        match &results[0].item {
            ResultItem::Product(p) => assert_eq!(p.product.price, Some(99.0)),
            other => panic!("expected product, got {:?}", other),
        }
        assert_eq!(results[0].signals.price_match, 1.0);
    }

    #[test]
    fn test_builder_requires_resolver_and_strategy() {
        assert!(SearchOrchestrator::builder().build().is_err());
        assert!(SearchOrchestrator::builder().resolver(resolver()).build().is_err());
    }
}
