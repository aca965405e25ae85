//! Merge product hits with the content hits that describe them
//!
//! A product and a guide page about it should surface as one result. Each
//! product claims at most one content hit, tried in order of match strength:
//!
//! 1. the hit's URL is the product permalink, or its slug is the product slug
//! 2. the normalized product name is contained in the hit title (or the reverse)
//! 3. at least 60% of the product name tokens appear in the hit's URL path
//!
//! Among matches of the strongest tier the most similar hit wins. Claimed
//! hits leave the pool; what remains is returned as unique content.

use crate::catalog::Product;
use crate::retrieval::{ContentCandidate, SearchMethod};
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Minimum share of product-name tokens found in a URL path
pub const TOKEN_OVERLAP_THRESHOLD: f32 = 0.6;

/// How a content hit was attached to a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Url,
    Name,
    TokenOverlap,
}

/// A product hit, optionally enriched with its describing content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedProduct {
    pub product: Product,
    pub similarity: f32,
    pub sources: Vec<SearchMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ContentCandidate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_kind: Option<MatchKind>,
}

impl EnrichedProduct {
    pub fn new(product: Product, similarity: f32, sources: Vec<SearchMethod>) -> Self {
        Self {
            product,
            similarity,
            sources,
            content: None,
            match_kind: None,
        }
    }

    fn merge_sources(&mut self, sources: &[SearchMethod]) {
        for method in sources {
            if !self.sources.contains(method) {
                self.sources.push(*method);
            }
        }
    }
}

/// Output of [`consolidate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consolidation {
    pub enriched_products: Vec<EnrichedProduct>,
    pub unique_content: Vec<ContentCandidate>,
}

impl Consolidation {
    pub fn len(&self) -> usize {
        self.enriched_products.len() + self.unique_content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Attach content hits to products and drop duplicates
pub fn consolidate(products: Vec<EnrichedProduct>, content: Vec<ContentCandidate>) -> Consolidation {
    let mut products = dedupe_products(products);
    products.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut pool = dedupe_content(content);

    let mut claimed_urls: HashSet<String> = HashSet::new();
    for product in &mut products {
        if let Some(permalink) = product.product.permalink.as_deref() {
            if !permalink.is_empty() {
                claimed_urls.insert(text::canonical_url(permalink));
            }
        }

        let Some((index, kind)) = best_match(&product.product, &pool) else {
            continue;
        };
        let hit = pool.remove(index);
        claimed_urls.insert(text::canonical_url(&hit.url));
        product.similarity = product.similarity.max(hit.similarity);
        product.merge_sources(&hit.sources);
        product.match_kind = Some(kind);
        product.content = Some(hit);
    }

    pool.retain(|hit| !claimed_urls.contains(&text::canonical_url(&hit.url)));

    Consolidation {
        enriched_products: products,
        unique_content: pool,
    }
}

/// One entry per product id, and per permalink when one is set
fn dedupe_products(products: Vec<EnrichedProduct>) -> Vec<EnrichedProduct> {
    let mut kept: Vec<EnrichedProduct> = Vec::with_capacity(products.len());
    let mut permalinks: HashSet<String> = HashSet::new();

    for product in products {
        if let Some(existing) = kept.iter_mut().find(|p| p.product.id == product.product.id) {
            existing.similarity = existing.similarity.max(product.similarity);
            existing.merge_sources(&product.sources);
            continue;
        }
        let permalink = product
            .product
            .permalink
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(text::canonical_url);
        if let Some(permalink) = permalink {
            if !permalinks.insert(permalink) {
                continue;
            }
        }
        kept.push(product);
    }
    kept
}

/// One hit per page URL: the most similar chunk, carrying every source
fn dedupe_content(content: Vec<ContentCandidate>) -> Vec<ContentCandidate> {
    let mut kept: Vec<ContentCandidate> = Vec::with_capacity(content.len());
    for mut hit in content {
        let key = hit.identity_key();
        let Some(existing) = kept.iter_mut().find(|c| c.identity_key() == key) else {
            kept.push(hit);
            continue;
        };
        if hit.similarity > existing.similarity {
            let mut sources = std::mem::take(&mut existing.sources);
            for method in hit.sources.drain(..) {
                if !sources.contains(&method) {
                    sources.push(method);
                }
            }
            hit.sources = sources;
            *existing = hit;
        } else {
            for method in &hit.sources {
                existing.add_source(*method);
            }
        }
    }
    kept
}

fn best_match(product: &Product, pool: &[ContentCandidate]) -> Option<(usize, MatchKind)> {
    let name = text::normalize(&product.name);
    let name_slug = text::slugify(&product.name);
    let name_tokens = text::tokenize(&product.name);
    let permalink = product
        .permalink
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| (text::canonical_url(p), text::url_slug(p)));

    let matches_url = |hit: &ContentCandidate| {
        let slug = text::url_slug(&hit.url);
        if let Some((canonical, permalink_slug)) = &permalink {
            if *canonical == text::canonical_url(&hit.url) {
                return true;
            }
            if slug.is_some() && slug == *permalink_slug {
                return true;
            }
        }
        !name_slug.is_empty() && slug.as_deref() == Some(name_slug.as_str())
    };
    let matches_name = |hit: &ContentCandidate| {
        let title = text::normalize(&hit.title);
        !name.is_empty() && !title.is_empty() && (title.contains(&name) || name.contains(&title))
    };
    let matches_tokens = |hit: &ContentCandidate| {
        token_overlap(&name_tokens, &text::url_path_tokens(&hit.url)) >= TOKEN_OVERLAP_THRESHOLD
    };

    let tiers: [(MatchKind, &dyn Fn(&ContentCandidate) -> bool); 3] = [
        (MatchKind::Url, &matches_url),
        (MatchKind::Name, &matches_name),
        (MatchKind::TokenOverlap, &matches_tokens),
    ];

    for (kind, matches) in tiers {
        let best = pool
            .iter()
            .enumerate()
            .filter(|(_, hit)| matches(*hit))
            .max_by(|(_, a), (_, b)| {
                a.similarity
                    .partial_cmp(&b.similarity)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some((index, _)) = best {
            return Some((index, kind));
        }
    }
    None
}

/// Share of `name_tokens` present in `path_tokens`
fn token_overlap(name_tokens: &[String], path_tokens: &[String]) -> f32 {
    if name_tokens.is_empty() {
        return 0.0;
    }
    let path: HashSet<&str> = path_tokens.iter().map(String::as_str).collect();
    let shared = name_tokens.iter().filter(|t| path.contains(t.as_str())).count();
    shared as f32 / name_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, name: &str, permalink: Option<&str>, similarity: f32) -> EnrichedProduct {
        let mut product = Product::new(id, name);
        product.permalink = permalink.map(str::to_string);
        EnrichedProduct::new(product, similarity, vec![SearchMethod::Vector])
    }

    fn page(url: &str, title: &str, similarity: f32) -> ContentCandidate {
        ContentCandidate::page(url, title, url, "", Some(0))
            .with_similarity(similarity)
            .with_source(SearchMethod::Keyword)
    }

    #[test]
    fn test_name_containment_merges_guide_into_product() {
        let result = consolidate(
            vec![product("p1", "Hydraulic Pump XYZ", None, 0.8)],
            vec![page("https://s.com/guides/pumps", "Hydraulic Pump XYZ – Product Guide", 0.7)],
        );

        assert_eq!(result.enriched_products.len(), 1);
        assert!(result.unique_content.is_empty());
        let enriched = &result.enriched_products[0];
        assert_eq!(enriched.match_kind, Some(MatchKind::Name));
        assert!(enriched.content.is_some());
        assert_eq!(enriched.sources, vec![SearchMethod::Vector, SearchMethod::Keyword]);
    }

    #[test]
    fn test_trademark_signs_do_not_block_name_match() {
        let result = consolidate(
            vec![product("p1", "AquaFlow™ Filter", None, 0.5)],
            vec![page("https://s.com/a", "aquaflow filter installation", 0.4)],
        );
        assert_eq!(result.enriched_products[0].match_kind, Some(MatchKind::Name));
    }

    #[test]
    fn test_url_match_beats_more_similar_name_match() {
        let result = consolidate(
            vec![product("p1", "Pump", Some("https://s.com/product/pump/"), 0.5)],
            vec![
                page("https://s.com/blog/pump-news", "Pump news", 0.9),
                page("https://www.s.com/product/pump", "Buy now", 0.3),
            ],
        );
        let enriched = &result.enriched_products[0];
        assert_eq!(enriched.match_kind, Some(MatchKind::Url));
        assert_eq!(
            enriched.content.as_ref().map(|c| c.title.as_str()),
            Some("Buy now")
        );
        assert_eq!(result.unique_content.len(), 1);
    }

    #[test]
    fn test_token_overlap_on_url_path() {
        let result = consolidate(
            vec![product("p1", "Heavy Duty Extension Cable", None, 0.5)],
            vec![page("https://s.com/shop/heavy-duty-extension-leads", "Leads", 0.4)],
        );
        assert_eq!(
            result.enriched_products[0].match_kind,
            Some(MatchKind::TokenOverlap)
        );
    }

    #[test]
    fn test_below_overlap_threshold_stays_unique() {
        let result = consolidate(
            vec![product("p1", "Heavy Duty Extension Cable", None, 0.5)],
            vec![page("https://s.com/shop/heavy-things", "Things", 0.4)],
        );
        assert!(result.enriched_products[0].content.is_none());
        assert_eq!(result.unique_content.len(), 1);
    }

    #[test]
    fn test_duplicates_removed() {
        let result = consolidate(
            vec![
                product("p1", "Pump", Some("https://s.com/p/pump"), 0.5),
                product("p1", "Pump", Some("https://s.com/p/pump"), 0.7),
                product("p2", "Pump copy", Some("https://s.com/p/pump"), 0.6),
            ],
            vec![
                page("https://s.com/about", "About us", 0.4),
                page("https://s.com/about/", "About us", 0.6),
                page("https://s.com/p/pump?ref=1", "Pump page", 0.4),
            ],
        );

        assert_eq!(result.enriched_products.len(), 1);
        assert!((result.enriched_products[0].similarity - 0.7).abs() < 1e-6);
        assert_eq!(result.unique_content.len(), 1);
        assert!((result.unique_content[0].similarity - 0.6).abs() < 1e-6);

        let mut urls = HashSet::new();
        for p in &result.enriched_products {
            if let Some(link) = &p.product.permalink {
                assert!(urls.insert(text::canonical_url(link)));
            }
        }
        for c in &result.unique_content {
            assert!(urls.insert(text::canonical_url(&c.url)));
        }
    }

    #[test]
    fn test_chunks_of_one_page_collapse_to_best() {
        let chunk = |index: u32, similarity: f32, method: SearchMethod| {
            ContentCandidate::page(
                format!("cable#{}", index),
                "Cable guide",
                "https://s.com/guides/cable",
                "",
                Some(index),
            )
            .with_similarity(similarity)
            .with_source(method)
        };
        let result = consolidate(
            vec![],
            vec![
                chunk(0, 0.4, SearchMethod::Keyword),
                chunk(1, 0.8, SearchMethod::Vector),
                chunk(2, 0.6, SearchMethod::Keyword),
            ],
        );

        assert_eq!(result.unique_content.len(), 1);
        let best = &result.unique_content[0];
        assert_eq!(best.chunk_index, Some(1));
        assert!((best.similarity - 0.8).abs() < 1e-6);
        assert_eq!(best.sources, vec![SearchMethod::Keyword, SearchMethod::Vector]);
    }

    #[test]
    fn test_each_hit_claimed_once() {
        let result = consolidate(
            vec![
                product("p1", "Pump", None, 0.9),
                product("p2", "Pump", None, 0.8),
            ],
            vec![page("https://s.com/guide", "Pump guide", 0.5)],
        );
        assert!(result.enriched_products[0].content.is_some());
        assert!(result.enriched_products[1].content.is_none());
        assert_eq!(result.len(), 2);
    }
}
