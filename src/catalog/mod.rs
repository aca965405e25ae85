//! Catalog records supplied by the merchant's catalog provider
//!
//! The core never fetches catalog data itself. Callers hand over a
//! [`TenantCatalog`] snapshot, which the fallback strategy searches and the
//! orchestrator uses to hydrate product hits.

mod ingest;

pub use ingest::{CatalogIndexer, IndexReport};

use crate::error::{Result, TenantSearchError};
use crate::retrieval::ContentCandidate;
use crate::tenant::TenantId;
use crate::text;
use ahash::{HashMap, HashMapExt};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const SNIPPET_CHARS: usize = 200;

/// Stock state of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Product record as fetched from the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default)]
    pub stock: StockStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Product {
    /// Product with only identity fields; every other field unknown
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            sku: None,
            price: None,
            stock: StockStatus::Unknown,
            sales_count: None,
            created_at: None,
            permalink: None,
            categories: Vec::new(),
            description: None,
        }
    }

    /// Text embedded and keyword-indexed for this product
    pub fn search_text(&self) -> String {
        let mut parts = vec![self.name.clone()];
        if let Some(sku) = &self.sku {
            parts.push(sku.clone());
        }
        parts.extend(self.categories.iter().cloned());
        if let Some(description) = &self.description {
            parts.push(description.clone());
        }
        parts.join(" ")
    }

    /// Retrieval candidate for this product (similarity unset)
    pub fn to_candidate(&self) -> ContentCandidate {
        ContentCandidate::product(
            self.id.clone(),
            self.name.clone(),
            self.permalink.clone().unwrap_or_default(),
            text::preview(self.description.as_deref().unwrap_or(&self.name), SNIPPET_CHARS),
        )
    }
}

/// One indexed chunk of a website page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageChunk {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub chunk_index: u32,
    pub text: String,
}

impl PageChunk {
    /// Stable id of the chunk within its tenant
    pub fn id(&self) -> String {
        format!("{}#{}", text::canonical_url(&self.url), self.chunk_index)
    }

    /// Retrieval candidate for this chunk (similarity unset)
    pub fn to_candidate(&self) -> ContentCandidate {
        ContentCandidate::page(
            self.id(),
            self.title.clone(),
            self.url.clone(),
            text::preview(&self.text, SNIPPET_CHARS),
            Some(self.chunk_index),
        )
    }
}

/// Everything one tenant has indexed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub pages: Vec<PageChunk>,
}

impl TenantCatalog {
    pub fn product(&self, id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.id == id)
    }
}

/// Thread-safe per-tenant catalog snapshots
#[derive(Default)]
pub struct Catalog {
    tenants: RwLock<HashMap<TenantId, Arc<TenantCatalog>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Replace a tenant's snapshot
    pub fn register(&self, tenant: TenantId, catalog: TenantCatalog) {
        self.tenants.write().insert(tenant, Arc::new(catalog));
    }

    /// Snapshot for a tenant, empty when none was registered
    pub fn snapshot(&self, tenant: &TenantId) -> Arc<TenantCatalog> {
        self.tenants
            .read()
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    pub fn tenant_count(&self) -> usize {
        self.tenants.read().len()
    }
}

/// JSON catalog file consumed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub domain: String,
    pub tenant_id: TenantId,
    #[serde(flatten)]
    pub catalog: TenantCatalog,
}

impl CatalogFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TenantSearchError::Io {
            source: e,
            context: format!("Failed to read catalog file: {:?}", path),
        })?;
        serde_json::from_str(&content).map_err(|e| TenantSearchError::Json {
            source: e,
            context: format!("Failed to parse catalog file: {:?}", path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_defaults_from_sparse_json() {
        let json = r#"{"id": "p1", "name": "Hydraulic Pump XYZ", "stock": "backordered"}"#;
        let product: Product = serde_json::from_str(json).unwrap();
        assert_eq!(product.stock, StockStatus::Unknown);
        assert_eq!(product.price, None);
        assert!(product.categories.is_empty());
    }

    #[test]
    fn test_catalog_file_parses() {
        let json = r#"{
            "domain": "thompsonseparts.co.uk",
            "tenant_id": "t-1",
            "products": [{"id": "p1", "name": "Pump", "price": 120.5, "stock": "in_stock"}],
            "pages": [{"url": "https://thompsonseparts.co.uk/a", "title": "A", "text": "alpha"}]
        }"#;
        let file: CatalogFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.tenant_id, TenantId::new("t-1"));
        assert_eq!(file.catalog.products[0].stock, StockStatus::InStock);
        assert_eq!(file.catalog.pages[0].chunk_index, 0);
        assert_eq!(file.catalog.pages[0].id(), "thompsonseparts.co.uk/a#0");
    }

    #[test]
    fn test_snapshot_of_unknown_tenant_is_empty() {
        let catalog = Catalog::new();
        catalog.register(
            TenantId::new("t1"),
            TenantCatalog {
                products: vec![Product::new("p1", "Pump")],
                pages: vec![],
            },
        );
        assert_eq!(catalog.snapshot(&TenantId::new("t1")).products.len(), 1);
        assert!(catalog.snapshot(&TenantId::new("t2")).products.is_empty());
        assert_eq!(catalog.tenant_count(), 1);
    }

    #[test]
    fn test_search_text_includes_sku_and_categories() {
        let mut product = Product::new("p1", "Extension Cable");
        product.sku = Some("EXT-10M".into());
        product.categories = vec!["Electrical".into()];
        assert_eq!(product.search_text(), "Extension Cable EXT-10M Electrical");
    }
}
