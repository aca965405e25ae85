/// Last-resort tier: plain substring and category matching over the catalog
use super::{sort_by_similarity, SearchStrategy, StrategyOutcome};
use crate::catalog::{Catalog, PageChunk, Product};
use crate::error::Result;
use crate::retrieval::{SearchMethod, SearchQuery};
use crate::tenant::TenantId;
use crate::text;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// Default ceiling on fallback similarity
pub const DEFAULT_MAX_SIMILARITY: f32 = 0.5;

/// Catalog scan strategy
///
/// Needs no index and no embedding provider, so it keeps working when both
/// other tiers are down. Its matches are coarse, so similarities are scaled
/// into `[0, max_similarity]` and the request threshold is ignored.
pub struct FallbackStrategy {
    catalog: Arc<Catalog>,
    max_similarity: f32,
}

impl FallbackStrategy {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            max_similarity: DEFAULT_MAX_SIMILARITY,
        }
    }

    pub fn with_max_similarity(mut self, max_similarity: f32) -> Self {
        self.max_similarity = max_similarity.clamp(0.0, 1.0);
        self
    }

    fn product_score(product: &Product, phrase: &str, tokens: &[String]) -> f32 {
        let name = text::normalize(&product.name);
        if !phrase.is_empty() && !name.is_empty() && (name.contains(phrase) || phrase.contains(&name)) {
            return 1.0;
        }

        let mut haystack: HashSet<String> = text::tokenize(&product.name).into_iter().collect();
        if let Some(sku) = &product.sku {
            haystack.insert(text::normalize(sku));
            haystack.extend(text::tokenize(sku));
        }
        for category in &product.categories {
            haystack.extend(text::tokenize(category));
        }
        token_share(tokens, &haystack)
    }

    fn page_score(page: &PageChunk, phrase: &str, tokens: &[String]) -> f32 {
        let title = text::normalize(&page.title);
        if !phrase.is_empty() && title.contains(phrase) {
            return 1.0;
        }

        let haystack: HashSet<String> = text::tokenize(&page.title).into_iter().collect();
        token_share(tokens, &haystack)
    }
}

fn token_share(tokens: &[String], haystack: &HashSet<String>) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens.iter().filter(|t| haystack.contains(*t)).count();
    matched as f32 / tokens.len() as f32
}

#[async_trait]
impl SearchStrategy for FallbackStrategy {
    fn method(&self) -> SearchMethod {
        SearchMethod::Fallback
    }

    async fn search(&self, tenant: &TenantId, query: &SearchQuery) -> Result<StrategyOutcome> {
        let snapshot = self.catalog.snapshot(tenant);
        let phrase = text::normalize(&query.text);
        let tokens = text::tokenize(&query.text);

        let products = snapshot.products.iter().filter_map(|product| {
            let score = Self::product_score(product, &phrase, &tokens);
            (score > 0.0).then(|| (product.to_candidate(), score))
        });
        let pages = snapshot.pages.iter().filter_map(|page| {
            let score = Self::page_score(page, &phrase, &tokens);
            (score > 0.0).then(|| (page.to_candidate(), score))
        });

        let mut candidates: Vec<_> = products
            .chain(pages)
            .map(|(candidate, score)| {
                candidate
                    .with_similarity(score * self.max_similarity)
                    .with_source(SearchMethod::Fallback)
            })
            .collect();
        sort_by_similarity(&mut candidates);
        candidates.truncate(query.limit);

        Ok(StrategyOutcome::Found(candidates))
    }
}
