//! Composite ranking over consolidated results
//!
//! Six signals, each in [0, 1], are combined as a weighted mean. A small bonus
//! is added for every additional strategy that independently found the same
//! item, and the total is clamped to [0, 1]. Missing data never fails the
//! ranking: an unknown signal scores a neutral 0.5.

use crate::catalog::StockStatus;
use crate::retrieval::consolidate::{Consolidation, EnrichedProduct};
use crate::retrieval::{ContentCandidate, SearchMethod};
use crate::text;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const NEUTRAL: f64 = 0.5;

/// Bonus per additional distinct strategy that returned an item
pub const DEFAULT_AGREEMENT_BONUS: f64 = 0.05;

/// Age at which the recency signal halves
pub const DEFAULT_RECENCY_HALF_LIFE_DAYS: f64 = 180.0;

/// Signal weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub semantic: f64,
    pub keyword: f64,
    pub stock: f64,
    pub price: f64,
    pub popularity: f64,
    pub recency: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            semantic: 0.40,
            keyword: 0.20,
            stock: 0.15,
            price: 0.10,
            popularity: 0.10,
            recency: 0.05,
        }
    }
}

impl RankingWeights {
    pub fn total(&self) -> f64 {
        self.semantic + self.keyword + self.stock + self.price + self.popularity + self.recency
    }

    /// Weights with `overrides` applied; negative or non-finite overrides are ignored
    pub fn with_overrides(&self, overrides: &WeightOverrides) -> Self {
        let pick = |base: f64, over: Option<f64>| match over {
            Some(w) if w.is_finite() && w >= 0.0 => w,
            _ => base,
        };
        Self {
            semantic: pick(self.semantic, overrides.semantic),
            keyword: pick(self.keyword, overrides.keyword),
            stock: pick(self.stock, overrides.stock),
            price: pick(self.price, overrides.price),
            popularity: pick(self.popularity, overrides.popularity),
            recency: pick(self.recency, overrides.recency),
        }
    }
}

/// Per-request override of any subset of [`RankingWeights`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recency: Option<f64>,
}

impl WeightOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw signal breakdown of one result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingSignals {
    pub semantic_similarity: f64,
    pub keyword_match: f64,
    pub stock_availability: f64,
    pub price_match: f64,
    pub popularity: f64,
    pub recency: f64,
    /// Agreement bonus applied on top of the weighted mean
    pub agreement_bonus: f64,
}

impl RankingSignals {
    fn weighted_mean(&self, weights: &RankingWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return self.semantic_similarity;
        }
        (self.semantic_similarity * weights.semantic
            + self.keyword_match * weights.keyword
            + self.stock_availability * weights.stock
            + self.price_match * weights.price
            + self.popularity * weights.popularity
            + self.recency * weights.recency)
            / total
    }

    fn contributions(&self, weights: &RankingWeights) -> [(&'static str, f64); 6] {
        let total = weights.total().max(f64::EPSILON);
        [
            ("semantic", self.semantic_similarity * weights.semantic / total),
            ("keyword", self.keyword_match * weights.keyword / total),
            ("stock", self.stock_availability * weights.stock / total),
            ("price", self.price_match * weights.price / total),
            ("popularity", self.popularity * weights.popularity / total),
            ("recency", self.recency * weights.recency / total),
        ]
    }
}

/// A ranked item: a product (possibly enriched) or a standalone content hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultItem {
    Product(EnrichedProduct),
    Content(ContentCandidate),
}

impl ResultItem {
    pub fn similarity(&self) -> f32 {
        match self {
            ResultItem::Product(p) => p.similarity,
            ResultItem::Content(c) => c.similarity,
        }
    }

    pub fn sources(&self) -> &[SearchMethod] {
        match self {
            ResultItem::Product(p) => &p.sources,
            ResultItem::Content(c) => &c.sources,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ResultItem::Product(p) => &p.product.name,
            ResultItem::Content(c) => &c.title,
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            ResultItem::Product(p) => p
                .product
                .permalink
                .as_deref()
                .or_else(|| p.content.as_ref().map(|c| c.url.as_str())),
            ResultItem::Content(c) => Some(&c.url),
        }
    }

    /// Chunk index of the page text behind this result
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            ResultItem::Product(p) => p.content.as_ref().and_then(|c| c.chunk_index),
            ResultItem::Content(c) => c.chunk_index,
        }
    }

    fn searchable_tokens(&self) -> HashSet<String> {
        let mut tokens = HashSet::new();
        match self {
            ResultItem::Product(p) => {
                tokens.extend(text::tokenize(&p.product.name));
                if let Some(sku) = &p.product.sku {
                    tokens.insert(text::normalize(sku));
                    tokens.extend(text::tokenize(sku));
                }
                if let Some(content) = &p.content {
                    tokens.extend(text::tokenize(&content.title));
                    tokens.extend(text::tokenize(&content.snippet));
                }
            }
            ResultItem::Content(c) => {
                tokens.extend(text::tokenize(&c.title));
                tokens.extend(text::tokenize(&c.snippet));
            }
        }
        tokens
    }
}

impl From<Consolidation> for Vec<ResultItem> {
    fn from(consolidation: Consolidation) -> Self {
        consolidation
            .enriched_products
            .into_iter()
            .map(ResultItem::Product)
            .chain(consolidation.unique_content.into_iter().map(ResultItem::Content))
            .collect()
    }
}

/// One ranked output item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub item: ResultItem,
    pub final_score: f64,
    pub signals: RankingSignals,
    pub explanation: String,
}

/// Request-level ranking inputs
#[derive(Debug, Clone, PartialEq)]
pub struct RankOptions {
    pub budget: Option<f64>,
    pub weights: WeightOverrides,
    /// Reference time for the recency signal
    pub now: DateTime<Utc>,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            budget: None,
            weights: WeightOverrides::default(),
            now: Utc::now(),
        }
    }
}

/// Scores and orders consolidated results
#[derive(Debug, Clone)]
pub struct Ranker {
    weights: RankingWeights,
    agreement_bonus: f64,
    recency_half_life_days: f64,
}

impl Default for Ranker {
    fn default() -> Self {
        Self::new(RankingWeights::default())
    }
}

impl Ranker {
    pub fn new(weights: RankingWeights) -> Self {
        Self {
            weights,
            agreement_bonus: DEFAULT_AGREEMENT_BONUS,
            recency_half_life_days: DEFAULT_RECENCY_HALF_LIFE_DAYS,
        }
    }

    pub fn with_agreement_bonus(mut self, bonus: f64) -> Self {
        self.agreement_bonus = bonus.max(0.0);
        self
    }

    pub fn with_recency_half_life(mut self, days: f64) -> Self {
        if days.is_finite() && days > 0.0 {
            self.recency_half_life_days = days;
        }
        self
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Score every item and sort by descending final score (stable on ties)
    pub fn rank(&self, query: &str, items: Vec<ResultItem>, options: &RankOptions) -> Vec<RankedResult> {
        let weights = self.weights.with_overrides(&options.weights);
        let query_tokens = text::tokenize(query);
        let max_sales = items
            .iter()
            .filter_map(|item| match item {
                ResultItem::Product(p) => p.product.sales_count,
                ResultItem::Content(_) => None,
            })
            .max()
            .unwrap_or(0);

        let mut ranked: Vec<RankedResult> = items
            .into_iter()
            .map(|item| {
                let signals = RankingSignals {
                    semantic_similarity: f64::from(crate::retrieval::clamp_unit(item.similarity())),
                    keyword_match: keyword_match(&query_tokens, &item),
                    stock_availability: stock_availability(&item),
                    price_match: price_match(&item, options.budget),
                    popularity: popularity(&item, max_sales),
                    recency: self.recency(&item, options.now),
                    agreement_bonus: self.agreement(&item),
                };
                let final_score =
                    (signals.weighted_mean(&weights) + signals.agreement_bonus).clamp(0.0, 1.0);
                let explanation = explain(&signals, &weights);
                RankedResult {
                    item,
                    final_score,
                    signals,
                    explanation,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    fn recency(&self, item: &ResultItem, now: DateTime<Utc>) -> f64 {
        let ResultItem::Product(p) = item else {
            return NEUTRAL;
        };
        let Some(created_at) = p.product.created_at else {
            return NEUTRAL;
        };
        let age_days = ((now - created_at).num_seconds() as f64 / 86_400.0).max(0.0);
        0.5_f64.powf(age_days / self.recency_half_life_days)
    }

    fn agreement(&self, item: &ResultItem) -> f64 {
        let distinct: HashSet<&SearchMethod> = item.sources().iter().collect();
        distinct.len().saturating_sub(1) as f64 * self.agreement_bonus
    }
}

fn keyword_match(query_tokens: &[String], item: &ResultItem) -> f64 {
    if query_tokens.is_empty() {
        return NEUTRAL;
    }
    let tokens = item.searchable_tokens();
    let matched = query_tokens.iter().filter(|t| tokens.contains(*t)).count();
    matched as f64 / query_tokens.len() as f64
}

fn stock_availability(item: &ResultItem) -> f64 {
    match item {
        ResultItem::Product(p) => match p.product.stock {
            StockStatus::InStock => 1.0,
            StockStatus::OutOfStock => 0.0,
            StockStatus::Unknown => NEUTRAL,
        },
        ResultItem::Content(_) => NEUTRAL,
    }
}

fn price_match(item: &ResultItem, budget: Option<f64>) -> f64 {
    let ResultItem::Product(p) = item else {
        return NEUTRAL;
    };
    match (p.product.price, budget) {
        (Some(price), Some(budget)) if price.is_finite() && budget.is_finite() && budget > 0.0 => {
            if price <= budget {
                1.0
            } else {
                (-(price - budget) / budget).exp()
            }
        }
        _ => NEUTRAL,
    }
}

fn popularity(item: &ResultItem, max_sales: u64) -> f64 {
    let ResultItem::Product(p) = item else {
        return NEUTRAL;
    };
    match p.product.sales_count {
        Some(sales) if max_sales > 0 => sales as f64 / max_sales as f64,
        _ => NEUTRAL,
    }
}

fn explain(signals: &RankingSignals, weights: &RankingWeights) -> String {
    let mut contributions = signals.contributions(weights);
    contributions.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut parts: Vec<String> = contributions
        .iter()
        .take(2)
        .filter(|(_, value)| *value > 0.0)
        .map(|(name, value)| format!("{} {:.2}", name, value))
        .collect();
    if signals.agreement_bonus > 0.0 {
        parts.push(format!("agreement +{:.2}", signals.agreement_bonus));
    }
    if parts.is_empty() {
        "no matching signals".to_string()
    } else {
        parts.join(", ")
    }
}
