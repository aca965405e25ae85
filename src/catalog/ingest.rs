/// Writes a tenant's catalog snapshot into the keyword and vector indexes
use super::{Catalog, TenantCatalog};
use crate::embedding::{EmbeddingGate, HnswVectorStore, KeywordDocument, KeywordIndex};
use crate::error::Result;
use crate::retrieval::ContentCandidate;
use crate::tenant::TenantId;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of indexing one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub products: usize,
    pub pages: usize,
    /// Items whose embedding or vector insert failed; they remain keyword-searchable
    pub failed: usize,
    pub duration_ms: u64,
}

struct IndexItem {
    candidate: ContentCandidate,
    text: String,
    sku: Option<String>,
}

/// Indexes catalog snapshots
///
/// Without an embedding gate only the keyword index and the snapshot are
/// written; the vector tier then has nothing to search for that tenant.
pub struct CatalogIndexer {
    keyword_index: Arc<RwLock<KeywordIndex>>,
    catalog: Arc<Catalog>,
    vectors: Option<(Arc<EmbeddingGate>, Arc<HnswVectorStore>)>,
    batch_size: usize,
}

impl CatalogIndexer {
    /// Create a new indexer
    ///
    /// # Arguments
    /// * `keyword_index` - Keyword index receiving item text
    /// * `catalog` - Snapshot registry the fallback strategy reads
    /// * `batch_size` - Number of items to embed per provider call
    pub fn new(keyword_index: Arc<RwLock<KeywordIndex>>, catalog: Arc<Catalog>, batch_size: usize) -> Self {
        Self {
            keyword_index,
            catalog,
            vectors: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Also embed items through `gate` into `vector_store`
    pub fn with_vectors(mut self, gate: Arc<EmbeddingGate>, vector_store: Arc<HnswVectorStore>) -> Self {
        self.vectors = Some((gate, vector_store));
        self
    }

    /// Replace everything indexed for `tenant` with `snapshot`
    pub async fn index_tenant(
        &self,
        tenant: &TenantId,
        snapshot: TenantCatalog,
    ) -> Result<IndexReport> {
        let start = Instant::now();
        let items = Self::items(&snapshot);

        info!(
            tenant = %tenant,
            products = snapshot.products.len(),
            pages = snapshot.pages.len(),
            "Indexing tenant catalog"
        );

        {
            let mut keyword_index = self.keyword_index.write().await;
            keyword_index.delete_tenant(tenant);
            for item in &items {
                keyword_index.insert(
                    tenant,
                    &KeywordDocument {
                        item: item.candidate.clone(),
                        body: item.text.clone(),
                        sku: item.sku.clone(),
                    },
                )?;
            }
            keyword_index.commit()?;
        }

        let mut failed = 0;
        if let Some((gate, vector_store)) = &self.vectors {
            vector_store.clear(tenant);
            for chunk in items.chunks(self.batch_size) {
                match Self::embed_chunk(gate, vector_store, tenant, chunk).await {
                    Ok(count) => debug!(tenant = %tenant, count, "Embedded chunk"),
                    Err(e) => {
                        warn!(tenant = %tenant, error = %e, "Failed to embed chunk");
                        failed += chunk.len();
                    }
                }
            }
        }

        let report = IndexReport {
            products: snapshot.products.len(),
            pages: snapshot.pages.len(),
            failed,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        self.catalog.register(tenant.clone(), snapshot);

        info!(
            tenant = %tenant,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Tenant catalog indexed"
        );

        Ok(report)
    }

    async fn embed_chunk(
        gate: &EmbeddingGate,
        vector_store: &HnswVectorStore,
        tenant: &TenantId,
        chunk: &[IndexItem],
    ) -> Result<usize> {
        let texts: Vec<String> = chunk.iter().map(|item| item.text.clone()).collect();
        let vectors = gate.embed_batch(&texts).await?;

        let pairs = chunk
            .iter()
            .zip(vectors)
            .map(|(item, vector)| (item.candidate.clone(), vector.to_vec()))
            .collect();
        vector_store.insert_batch(tenant, pairs)?;

        Ok(chunk.len())
    }

    /// Products first, then pages, in snapshot order
    fn items(snapshot: &TenantCatalog) -> Vec<IndexItem> {
        let products = snapshot.products.iter().map(|product| IndexItem {
            candidate: product.to_candidate(),
            text: product.search_text(),
            sku: product.sku.clone(),
        });
        let pages = snapshot.pages.iter().map(|page| IndexItem {
            candidate: page.to_candidate(),
            text: format!("{} {}", page.title, page.text),
            sku: None,
        });
        products.chain(pages).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PageChunk, Product};
    use crate::embedding::{EmbeddingError, EmbeddingProvider, HnswParams, VectorStore};

    /// Bag-of-letters provider: similar spellings give similar vectors
    struct LetterProvider;

    impl EmbeddingProvider for LetterProvider {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            let mut v = vec![0.0; 26];
            for c in text.chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            26
        }

        fn model_name(&self) -> &str {
            "letters"
        }
    }

    fn snapshot() -> TenantCatalog {
        let mut pump = Product::new("p1", "Hydraulic Pump");
        pump.sku = Some("HP-1".into());
        TenantCatalog {
            products: vec![pump],
            pages: vec![PageChunk {
                url: "https://shop.com/guides/cables".into(),
                title: "Cable guide".into(),
                chunk_index: 2,
                text: "choosing an extension cable".into(),
            }],
        }
    }

    #[tokio::test]
    async fn test_index_tenant_populates_all_stores() {
        let gate = Arc::new(EmbeddingGate::new(Arc::new(LetterProvider), 64));
        let vector_store = Arc::new(HnswVectorStore::new(HnswParams {
            dimension: 26,
            max_elements: 100,
            ..HnswParams::default()
        }));
        let keyword_index = Arc::new(RwLock::new(KeywordIndex::in_memory().unwrap()));
        let catalog = Arc::new(Catalog::new());
        let tenant = TenantId::new("t1");

        let indexer = CatalogIndexer::new(keyword_index.clone(), catalog.clone(), 8)
            .with_vectors(gate, vector_store.clone());
        let report = indexer.index_tenant(&tenant, snapshot()).await.unwrap();

        assert_eq!(report.products, 1);
        assert_eq!(report.pages, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(vector_store.len(&tenant), 2);
        assert_eq!(keyword_index.read().await.len(), 2);
        assert_eq!(catalog.snapshot(&tenant).products.len(), 1);

        let query = LetterProvider.embed("extension cable").unwrap();
        let hits = vector_store.search(&tenant, &query, 0.5, 5).await.unwrap();
        assert_eq!(hits[0].chunk_index, Some(2));
    }

    #[tokio::test]
    async fn test_reindex_replaces_previous_snapshot() {
        let gate = Arc::new(EmbeddingGate::new(Arc::new(LetterProvider), 64));
        let vector_store = Arc::new(HnswVectorStore::new(HnswParams {
            dimension: 26,
            max_elements: 100,
            ..HnswParams::default()
        }));
        let keyword_index = Arc::new(RwLock::new(KeywordIndex::in_memory().unwrap()));
        let catalog = Arc::new(Catalog::new());
        let tenant = TenantId::new("t1");
        let indexer = CatalogIndexer::new(keyword_index.clone(), catalog, 1)
            .with_vectors(gate, vector_store.clone());

        indexer.index_tenant(&tenant, snapshot()).await.unwrap();
        indexer.index_tenant(&tenant, snapshot()).await.unwrap();

        assert_eq!(vector_store.len(&tenant), 2);
        assert_eq!(keyword_index.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_only_indexing() {
        let keyword_index = Arc::new(RwLock::new(KeywordIndex::in_memory().unwrap()));
        let catalog = Arc::new(Catalog::new());
        let tenant = TenantId::new("t1");
        let indexer = CatalogIndexer::new(keyword_index.clone(), catalog.clone(), 4);

        let report = indexer.index_tenant(&tenant, snapshot()).await.unwrap();

        assert_eq!(report.failed, 0);
        assert_eq!(keyword_index.read().await.len(), 2);
        assert_eq!(catalog.snapshot(&tenant).pages.len(), 1);
    }
}
