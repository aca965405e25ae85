/// Semantic tier: query embedding through the gate, neighbours from the store
use super::{SearchStrategy, StrategyOutcome};
use crate::embedding::{EmbeddingGate, VectorStore};
use crate::error::Result;
use crate::retrieval::{SearchMethod, SearchQuery};
use crate::tenant::TenantId;
use async_trait::async_trait;
use std::sync::Arc;

pub struct VectorStrategy {
    gate: Arc<EmbeddingGate>,
    store: Arc<dyn VectorStore>,
}

impl VectorStrategy {
    pub fn new(gate: Arc<EmbeddingGate>, store: Arc<dyn VectorStore>) -> Self {
        Self { gate, store }
    }
}

#[async_trait]
impl SearchStrategy for VectorStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Vector
    }

    async fn search(&self, tenant: &TenantId, query: &SearchQuery) -> Result<StrategyOutcome> {
        let embedding = self.gate.embed(&query.text).await?;

        let candidates = self
            .store
            .search(tenant, &embedding, query.threshold, query.limit)
            .await?
            .into_iter()
            .map(|c| c.with_source(SearchMethod::Vector))
            .collect();

        Ok(StrategyOutcome::Found(candidates))
    }
}
