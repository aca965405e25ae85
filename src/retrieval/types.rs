//! Candidate, query and option types shared across the retrieval pipeline

use crate::retrieval::ranking::WeightOverrides;
use crate::text;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which retrieval tier produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Keyword,
    Vector,
    Fallback,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Keyword => "keyword",
            SearchMethod::Vector => "vector",
            SearchMethod::Fallback => "fallback",
        }
    }

    /// Parse a config name (`keyword`, `vector`, `fallback`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "keyword" => Some(SearchMethod::Keyword),
            "vector" => Some(SearchMethod::Vector),
            "fallback" => Some(SearchMethod::Fallback),
            _ => None,
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of retrieved item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Page,
    Product,
}

/// A retrieved page chunk or product hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentCandidate {
    /// Identifier within the tenant (page chunk id or product id)
    pub id: String,

    pub kind: CandidateKind,

    /// Page title or product name
    pub title: String,

    /// Page URL or product permalink
    pub url: String,

    /// Matched text excerpt
    pub snippet: String,

    /// Similarity in [0, 1], higher is better
    pub similarity: f32,

    /// Catalog product id, set for product hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Position of the chunk within its page, set for page hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,

    /// Strategies that returned this item; the first one produced it
    #[serde(default)]
    pub sources: Vec<SearchMethod>,
}

impl ContentCandidate {
    /// Page chunk hit
    pub fn page(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        snippet: impl Into<String>,
        chunk_index: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: CandidateKind::Page,
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
            similarity: 0.0,
            product_id: None,
            chunk_index,
            sources: Vec::new(),
        }
    }

    /// Product hit
    pub fn product(
        product_id: impl Into<String>,
        name: impl Into<String>,
        permalink: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        let product_id = product_id.into();
        Self {
            id: product_id.clone(),
            kind: CandidateKind::Product,
            title: name.into(),
            url: permalink.into(),
            snippet: snippet.into(),
            similarity: 0.0,
            product_id: Some(product_id),
            chunk_index: None,
            sources: Vec::new(),
        }
    }

    pub fn with_similarity(mut self, similarity: f32) -> Self {
        self.similarity = clamp_unit(similarity);
        self
    }

    pub fn with_source(mut self, method: SearchMethod) -> Self {
        self.add_source(method);
        self
    }

    /// Record that `method` also returned this item
    pub fn add_source(&mut self, method: SearchMethod) {
        if !self.sources.contains(&method) {
            self.sources.push(method);
        }
    }

    /// Stable identity used for deduplication across tiers
    ///
    /// Products by product id; pages by canonical URL, so chunks of one page
    /// collapse into a single result. Pages without a URL fall back to their id.
    pub fn identity_key(&self) -> String {
        if let Some(product_id) = &self.product_id {
            return format!("product:{}", product_id);
        }
        let url = text::canonical_url(&self.url);
        if url.is_empty() {
            format!("page:{}", self.id)
        } else {
            format!("url:{}", url)
        }
    }

    pub fn is_product(&self) -> bool {
        self.kind == CandidateKind::Product && self.product_id.is_some()
    }
}

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Normalized query handed to strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Lower-cased, whitespace-collapsed query text
    pub text: String,

    /// Maximum number of results
    pub limit: usize,

    /// Minimum similarity in [0, 1]
    pub threshold: f32,
}

impl SearchQuery {
    pub fn new(text: &str, limit: usize, threshold: f32) -> Self {
        Self {
            text: text::collapse_whitespace(text),
            limit,
            threshold,
        }
    }
}

/// Per-request ranking options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Shopper budget; enables the price signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,

    /// Overrides for a subset of ranking weights
    #[serde(default)]
    pub weights: WeightOverrides,
}

impl SearchOptions {
    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = Some(budget);
        self
    }
}
