/// Tenant-scoped HNSW vector store for similarity search
use crate::retrieval::ContentCandidate;
use crate::tenant::TenantId;
use ahash::{HashMap, HashMapExt};
use async_trait::async_trait;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Nearest-neighbour lookup over stored item vectors
///
/// Given a tenant, a query vector, a threshold and a limit, returns items at or
/// above the threshold ordered by descending similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(
        &self,
        tenant: &TenantId,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ContentCandidate>, VectorIndexError>;
}

/// HNSW parameters
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Vector dimension (must match embedding dimension)
    pub dimension: usize,
    /// Construction parameter (higher = better recall, slower build)
    pub ef_construction: usize,
    /// Connections per layer
    pub m: usize,
    /// Search parameter (higher = better recall, slower search)
    pub ef_search: usize,
    /// Capacity hint per tenant
    pub max_elements: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            dimension: 384,
            ef_construction: 200,
            m: 16,
            ef_search: 64,
            max_elements: 100_000,
        }
    }
}

const MAX_LAYERS: usize = 16;

struct TenantVectors {
    index: Hnsw<'static, f32, DistCosine>,
    /// HNSW data id → stored item
    items: Vec<ContentCandidate>,
}

/// In-process HNSW store, one graph per tenant
///
/// Uses cosine distance; similarity is reported as `1 - distance`.
pub struct HnswVectorStore {
    params: HnswParams,
    tenants: RwLock<HashMap<TenantId, TenantVectors>>,
}

impl HnswVectorStore {
    pub fn new(params: HnswParams) -> Self {
        Self {
            params,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    fn new_graph(&self) -> Hnsw<'static, f32, DistCosine> {
        Hnsw::<f32, DistCosine>::new(
            self.params.m,
            self.params.max_elements,
            MAX_LAYERS,
            self.params.ef_construction,
            DistCosine,
        )
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), VectorIndexError> {
        if vector.len() != self.params.dimension {
            return Err(VectorIndexError::InvalidDimension {
                expected: self.params.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert an item vector for a tenant
    pub fn insert(
        &self,
        tenant: &TenantId,
        item: ContentCandidate,
        vector: &[f32],
    ) -> Result<(), VectorIndexError> {
        self.check_dimension(vector)?;

        if vector.iter().all(|x| *x == 0.0) {
            return Err(VectorIndexError::InsertError(format!(
                "Zero vector for item {}",
                item.id
            )));
        }

        let data = vector.to_vec();
        let mut tenants = self.tenants.write();
        let entry = tenants
            .entry(tenant.clone())
            .or_insert_with(|| TenantVectors {
                index: self.new_graph(),
                items: Vec::new(),
            });

        let data_id = entry.items.len();
        entry.index.insert((&data, data_id));
        entry.items.push(item);

        Ok(())
    }

    /// Insert multiple items in batch
    pub fn insert_batch(
        &self,
        tenant: &TenantId,
        items: Vec<(ContentCandidate, Vec<f32>)>,
    ) -> Result<(), VectorIndexError> {
        for (item, vector) in items {
            self.insert(tenant, item, &vector)?;
        }
        Ok(())
    }

    /// Number of vectors stored for a tenant
    pub fn len(&self, tenant: &TenantId) -> usize {
        self.tenants
            .read()
            .get(tenant)
            .map(|t| t.items.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, tenant: &TenantId) -> bool {
        self.len(tenant) == 0
    }

    /// Drop every vector of a tenant
    pub fn clear(&self, tenant: &TenantId) {
        self.tenants.write().remove(tenant);
    }

    pub fn dimension(&self) -> usize {
        self.params.dimension
    }
}

#[async_trait]
impl VectorStore for HnswVectorStore {
    async fn search(
        &self,
        tenant: &TenantId,
        query: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ContentCandidate>, VectorIndexError> {
        self.check_dimension(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let tenants = self.tenants.read();
        let Some(vectors) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        if vectors.items.is_empty() {
            return Ok(Vec::new());
        }

        let ef_search = self.params.ef_search.max(limit);
        let neighbours = vectors.index.search(query, limit, ef_search);

        let mut results = Vec::with_capacity(neighbours.len());
        for neighbour in neighbours {
            let item = vectors.items.get(neighbour.d_id).ok_or_else(|| {
                VectorIndexError::SearchError(format!("Unknown data id {}", neighbour.d_id))
            })?;
            let similarity = 1.0 - neighbour.distance;
            if similarity >= threshold {
                results.push(item.clone().with_similarity(similarity));
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> HnswParams {
        HnswParams {
            dimension: 4,
            max_elements: 100,
            ..HnswParams::default()
        }
    }

    fn page(id: &str) -> ContentCandidate {
        ContentCandidate::page(id, id, format!("https://shop.com/{}", id), "", None)
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let store = HnswVectorStore::new(params());
        let tenant = TenantId::new("t1");

        store.insert(&tenant, page("a"), &[1.0, 0.0, 0.0, 0.0]).unwrap();
        store.insert(&tenant, page("b"), &[0.0, 1.0, 0.0, 0.0]).unwrap();
        store.insert(&tenant, page("c"), &[0.9, 0.1, 0.0, 0.0]).unwrap();
        assert_eq!(store.len(&tenant), 3);

        let results = store
            .search(&tenant, &[1.0, 0.0, 0.0, 0.0], 0.5, 10)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert_eq!(results[1].id, "c");
        assert!(results[0].similarity > 0.99);
        assert!(results[0].similarity >= results[1].similarity);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = HnswVectorStore::new(params());
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");

        store.insert(&t1, page("a"), &[1.0, 0.0, 0.0, 0.0]).unwrap();

        let results = store.search(&t2, &[1.0, 0.0, 0.0, 0.0], 0.0, 10).await.unwrap();
        assert!(results.is_empty());
        assert!(store.is_empty(&t2));
    }

    #[tokio::test]
    async fn test_dimension_validation() {
        let store = HnswVectorStore::new(params());
        let tenant = TenantId::new("t1");

        assert!(store.insert(&tenant, page("a"), &[1.0; 3]).is_err());
        assert!(matches!(
            store.search(&tenant, &[1.0; 5], 0.0, 5).await,
            Err(VectorIndexError::InvalidDimension { expected: 4, actual: 5 })
        ));
    }

    #[test]
    fn test_clear_tenant() {
        let store = HnswVectorStore::new(params());
        let tenant = TenantId::new("t1");
        store.insert(&tenant, page("a"), &[0.0, 0.0, 1.0, 0.0]).unwrap();
        store.clear(&tenant);
        assert!(store.is_empty(&tenant));
    }
}
