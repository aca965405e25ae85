//! Wires the search pipeline from configuration

use crate::catalog::{Catalog, CatalogFile, CatalogIndexer, IndexReport};
use crate::config::Config;
use crate::embedding::{EmbeddingGate, EmbeddingProvider, HnswParams, HnswVectorStore, KeywordIndex};
use crate::error::Result;
use crate::retrieval::{
    FallbackStrategy, InMemorySearchCache, KeywordStrategy, Ranker, SearchMethod, SearchOrchestrator,
    SearchStrategy, VectorStrategy,
};
use crate::tenant::{SqliteDomainStore, TenantResolver};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A fully wired orchestrator plus the indexer feeding it
pub struct SearchEngine {
    orchestrator: SearchOrchestrator,
    indexer: CatalogIndexer,
    domains: SqliteDomainStore,
    gate: Option<Arc<EmbeddingGate>>,
}

impl SearchEngine {
    /// Build every component from `config`
    ///
    /// Without an embedding provider the vector tier is left out of the chain
    /// and the remaining tiers serve requests on their own.
    pub fn build(
        config: &Config,
        domains: SqliteDomainStore,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let catalog = Arc::new(Catalog::new());
        let keyword_index = match config.keyword_index_path()? {
            Some(path) => {
                info!(path = ?path, "Opening on-disk keyword index");
                KeywordIndex::new(path)?
            }
            None => KeywordIndex::in_memory()?,
        };
        let keyword_index = Arc::new(RwLock::new(keyword_index));

        let vectors = provider.map(|provider| {
            let gate = Arc::new(EmbeddingGate::new(provider, config.embedding.cache_capacity));
            if gate.dimension() != config.indexing.vector_dim {
                warn!(
                    configured = config.indexing.vector_dim,
                    model = gate.dimension(),
                    "Vector dimension differs from model, using the model's"
                );
            }
            let store = Arc::new(HnswVectorStore::new(HnswParams {
                dimension: gate.dimension(),
                ef_construction: config.indexing.hnsw_ef_construction,
                m: config.indexing.hnsw_m,
                ef_search: config.indexing.hnsw_ef_search,
                max_elements: config.indexing.max_elements,
            }));
            (gate, store)
        });

        let mut builder = SearchOrchestrator::builder();
        for method in config.search.strategy_order() {
            let strategy: Arc<dyn SearchStrategy> = match (method, &vectors) {
                (SearchMethod::Keyword, _) => Arc::new(
                    KeywordStrategy::new(keyword_index.clone())
                        .with_candidate_multiplier(config.search.keyword_candidate_multiplier),
                ),
                (SearchMethod::Vector, Some((gate, store))) => {
                    Arc::new(VectorStrategy::new(gate.clone(), store.clone()))
                }
                (SearchMethod::Vector, None) => {
                    warn!("No embedding provider, vector strategy disabled");
                    continue;
                }
                (SearchMethod::Fallback, _) => Arc::new(
                    FallbackStrategy::new(catalog.clone())
                        .with_max_similarity(config.search.fallback_max_similarity),
                ),
            };
            builder = builder.strategy(strategy);
        }

        let resolver = Arc::new(TenantResolver::new(
            Arc::new(domains.clone()),
            config.tenants.negative_ttl()?,
        ));
        let cache = Arc::new(InMemorySearchCache::new(
            config.search.cache_capacity,
            config.search.cache_ttl()?,
        ));
        let ranker = Ranker::new(config.ranking.weights())
            .with_agreement_bonus(config.ranking.agreement_bonus)
            .with_recency_half_life(config.ranking.recency_half_life_days);

        let orchestrator = builder
            .resolver(resolver)
            .cache(cache)
            .catalog(catalog.clone())
            .ranker(ranker)
            .build()?;

        let mut indexer = CatalogIndexer::new(keyword_index, catalog, config.embedding.batch_size);
        let gate = match vectors {
            Some((gate, store)) => {
                indexer = indexer.with_vectors(gate.clone(), store);
                Some(gate)
            }
            None => None,
        };

        Ok(Self {
            orchestrator,
            indexer,
            domains,
            gate,
        })
    }

    /// Register the file's domain and index its catalog
    pub async fn load_catalog(&self, file: CatalogFile) -> Result<IndexReport> {
        self.domains.register(&file.domain, &file.tenant_id)?;
        let report = self.indexer.index_tenant(&file.tenant_id, file.catalog).await?;
        info!(domain = %file.domain, tenant = %file.tenant_id, "Catalog loaded");
        Ok(report)
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn gate(&self) -> Option<&Arc<EmbeddingGate>> {
        self.gate.as_ref()
    }
}
