/// Full-text tier over the tenant-scoped Tantivy index
use super::{sort_by_similarity, SearchStrategy, StrategyOutcome};
use crate::embedding::KeywordIndex;
use crate::error::Result;
use crate::retrieval::{SearchMethod, SearchQuery};
use crate::tenant::TenantId;
use crate::text;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// BM25 keyword strategy
///
/// Raw BM25 scores are unbounded, so each response is scaled relative to its
/// best hit before the threshold is applied.
pub struct KeywordStrategy {
    index: Arc<RwLock<KeywordIndex>>,
    /// Over-fetch factor before thresholding
    candidate_multiplier: usize,
}

impl KeywordStrategy {
    pub fn new(index: Arc<RwLock<KeywordIndex>>) -> Self {
        Self {
            index,
            candidate_multiplier: 2,
        }
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier.max(1);
        self
    }
}

#[async_trait]
impl SearchStrategy for KeywordStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Keyword
    }

    async fn search(&self, tenant: &TenantId, query: &SearchQuery) -> Result<StrategyOutcome> {
        let terms = text::tokenize(&query.text);
        if terms.is_empty() {
            debug!(query = %query.text, "No keyword-searchable tokens");
            return Ok(StrategyOutcome::NotApplicable);
        }

        let hits = {
            let index = self.index.read().await;
            index.search(
                tenant,
                &terms,
                query.limit.saturating_mul(self.candidate_multiplier),
            )?
        };

        let best = hits.iter().map(|h| h.score).fold(0.0_f32, f32::max);
        if best <= 0.0 {
            return Ok(StrategyOutcome::Found(Vec::new()));
        }

        let mut candidates: Vec<_> = hits
            .into_iter()
            .map(|hit| {
                hit.item
                    .with_similarity(hit.score / best)
                    .with_source(SearchMethod::Keyword)
            })
            .filter(|c| c.similarity >= query.threshold)
            .collect();
        sort_by_similarity(&mut candidates);

        Ok(StrategyOutcome::Found(candidates))
    }
}
