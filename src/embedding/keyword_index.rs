/// Tantivy keyword index for tenant-scoped full-text search
use crate::retrieval::{CandidateKind, ContentCandidate};
use crate::tenant::TenantId;
use crate::text;
use std::path::PathBuf;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, QueryParser, TermQuery};
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),

    #[error("Query parsing error: {0}")]
    QueryParseError(String),
}

/// Search hit with its raw BM25 score
#[derive(Debug, Clone)]
pub struct KeywordSearchResult {
    /// Stored item; `similarity` is left at 0 for the caller to fill
    pub item: ContentCandidate,
    /// BM25 relevance score
    pub score: f32,
}

/// Document to index
#[derive(Debug, Clone)]
pub struct KeywordDocument {
    pub item: ContentCandidate,
    /// Full text searched in addition to the title
    pub body: String,
    /// Product SKU / part number
    pub sku: Option<String>,
}

const SNIPPET_CHARS: usize = 200;
const WRITER_HEAP_BYTES: usize = 50_000_000;

struct Fields {
    tenant: Field,
    item_id: Field,
    kind: Field,
    title: Field,
    url: Field,
    body: Field,
    sku: Field,
    product_id: Field,
    chunk_index: Field,
}

impl Fields {
    fn from_schema(schema: &Schema) -> Result<Self, KeywordIndexError> {
        let get = |name: &str| {
            schema.get_field(name).map_err(|_| {
                KeywordIndexError::InitializationError(format!("Missing '{}' field in schema", name))
            })
        };
        Ok(Self {
            tenant: get("tenant")?,
            item_id: get("item_id")?,
            kind: get("kind")?,
            title: get("title")?,
            url: get("url")?,
            body: get("body")?,
            sku: get("sku")?,
            product_id: get("product_id")?,
            chunk_index: get("chunk_index")?,
        })
    }
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field("tenant", STRING | STORED);
    schema_builder.add_text_field("item_id", STRING | STORED);
    schema_builder.add_text_field("kind", STRING | STORED);
    schema_builder.add_text_field("title", TEXT | STORED);
    schema_builder.add_text_field("url", STRING | STORED);
    schema_builder.add_text_field("body", TEXT | STORED);
    schema_builder.add_text_field("sku", TEXT | STORED);
    schema_builder.add_text_field("product_id", STRING | STORED);
    schema_builder.add_u64_field("chunk_index", STORED);
    schema_builder.build()
}

/// Tantivy keyword index wrapper
///
/// Provides BM25 full-text search over page chunks and products, scoped by a
/// tenant term on every query.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: IndexWriter,
    fields: Fields,
}

impl KeywordIndex {
    /// Open the index at `index_path`, creating it when missing
    pub fn new(index_path: PathBuf) -> Result<Self, KeywordIndexError> {
        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(&index_path)?;
            Index::create_in_dir(&index_path, build_schema())
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        };
        Self::from_index(index)
    }

    /// Index held entirely in memory
    pub fn in_memory() -> Result<Self, KeywordIndexError> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self, KeywordIndexError> {
        let fields = Fields::from_schema(&index.schema())?;

        let writer = index
            .writer(WRITER_HEAP_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer,
            fields,
        })
    }

    /// Add a document for a tenant. Visible after [`commit`](Self::commit).
    pub fn insert(
        &mut self,
        tenant: &TenantId,
        document: &KeywordDocument,
    ) -> Result<(), KeywordIndexError> {
        let item = &document.item;
        let kind = match item.kind {
            CandidateKind::Page => "page",
            CandidateKind::Product => "product",
        };

        let mut doc = doc!(
            self.fields.tenant => tenant.as_str(),
            self.fields.item_id => item.id.as_str(),
            self.fields.kind => kind,
            self.fields.title => item.title.as_str(),
            self.fields.url => item.url.as_str(),
            self.fields.body => document.body.as_str(),
        );
        if let Some(sku) = &document.sku {
            doc.add_text(self.fields.sku, sku);
        }
        if let Some(product_id) = &item.product_id {
            doc.add_text(self.fields.product_id, product_id);
        }
        if let Some(chunk) = item.chunk_index {
            doc.add_u64(self.fields.chunk_index, u64::from(chunk));
        }

        self.writer
            .add_document(doc)
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        Ok(())
    }

    /// Commit all pending changes and refresh the reader
    pub fn commit(&mut self) -> Result<(), KeywordIndexError> {
        self.writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Search a tenant's documents for any of `terms`
    ///
    /// `terms` must already be normalized tokens; they are OR-ed across title,
    /// body and SKU. Results are sorted by BM25 score descending.
    pub fn search(
        &self,
        tenant: &TenantId,
        terms: &[String],
        limit: usize,
    ) -> Result<Vec<KeywordSearchResult>, KeywordIndexError> {
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();

        let query_parser = QueryParser::for_index(
            &self.index,
            vec![self.fields.title, self.fields.body, self.fields.sku],
        );
        let text_query = query_parser
            .parse_query(&terms.join(" "))
            .map_err(|e| KeywordIndexError::QueryParseError(e.to_string()))?;

        let tenant_query: Box<dyn Query> = Box::new(TermQuery::new(
            Term::from_field_text(self.fields.tenant, tenant.as_str()),
            IndexRecordOption::Basic,
        ));
        let query = BooleanQuery::new(vec![(Occur::Must, tenant_query), (Occur::Must, text_query)]);

        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;
            results.push(KeywordSearchResult {
                item: self.hydrate(&retrieved)?,
                score,
            });
        }

        Ok(results)
    }

    fn hydrate(&self, doc: &TantivyDocument) -> Result<ContentCandidate, KeywordIndexError> {
        let text_of = |field: Field| {
            doc.get_first(field)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let id = text_of(self.fields.item_id)
            .ok_or_else(|| KeywordIndexError::SearchError("Missing item_id field".to_string()))?;
        let title = text_of(self.fields.title).unwrap_or_default();
        let url = text_of(self.fields.url).unwrap_or_default();
        let snippet = text::preview(&text_of(self.fields.body).unwrap_or_default(), SNIPPET_CHARS);

        let item = match (text_of(self.fields.kind).as_deref(), text_of(self.fields.product_id)) {
            (Some("product"), Some(product_id)) => {
                ContentCandidate::product(product_id, title, url, snippet)
            }
            _ => {
                let chunk = doc
                    .get_first(self.fields.chunk_index)
                    .and_then(|v| v.as_u64())
                    .and_then(|c| u32::try_from(c).ok());
                ContentCandidate::page(id, title, url, snippet, chunk)
            }
        };

        Ok(item)
    }

    /// Remove every document of a tenant (takes effect on commit)
    pub fn delete_tenant(&mut self, tenant: &TenantId) {
        let term = Term::from_field_text(self.fields.tenant, tenant.as_str());
        self.writer.delete_term(term);
    }

    /// Number of committed documents across all tenants
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn page_doc(id: &str, title: &str, body: &str) -> KeywordDocument {
        KeywordDocument {
            item: ContentCandidate::page(id, title, format!("https://shop.com/{}", id), "", Some(0)),
            body: body.to_string(),
            sku: None,
        }
    }

    fn product_doc(id: &str, name: &str, sku: &str) -> KeywordDocument {
        KeywordDocument {
            item: ContentCandidate::product(id, name, format!("https://shop.com/p/{}", id), ""),
            body: format!("{} for industrial use", name),
            sku: Some(sku.to_string()),
        }
    }

    fn terms(q: &str) -> Vec<String> {
        text::tokenize(q)
    }

    #[test]
    fn test_index_creation() {
        let temp = TempDir::new().unwrap();
        let index = KeywordIndex::new(temp.path().join("kw")).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_insert_and_search_scoped_by_tenant() {
        let mut index = KeywordIndex::in_memory().unwrap();
        let t1 = TenantId::new("t1");
        let t2 = TenantId::new("t2");

        index
            .insert(&t1, &page_doc("c1", "Extension cables", "10mtr extension cable reels"))
            .unwrap();
        index
            .insert(&t1, &page_doc("c2", "Pumps", "hydraulic pumps and valves"))
            .unwrap();
        index
            .insert(&t2, &page_doc("c3", "Extension cables", "other tenant cables"))
            .unwrap();
        index.commit().unwrap();
        assert_eq!(index.len(), 3);

        let results = index.search(&t1, &terms("extension cables"), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item.id, "c1");
        assert_eq!(results[0].item.chunk_index, Some(0));
        assert!(results[0].score > 0.0);
    }

    #[test]
    fn test_sku_match_returns_product() {
        let mut index = KeywordIndex::in_memory().unwrap();
        let tenant = TenantId::new("t1");

        index
            .insert(&tenant, &product_doc("p1", "Hydraulic Pump", "HP-4521"))
            .unwrap();
        index
            .insert(&tenant, &product_doc("p2", "Gear Pump", "GP-100"))
            .unwrap();
        index.commit().unwrap();

        let results = index.search(&tenant, &terms("hp-4521"), 10).unwrap();
        assert_eq!(results[0].item.product_id.as_deref(), Some("p1"));
        assert_eq!(results[0].item.kind, CandidateKind::Product);
    }

    #[test]
    fn test_empty_terms_return_nothing() {
        let index = KeywordIndex::in_memory().unwrap();
        let results = index.search(&TenantId::new("t1"), &[], 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_delete_tenant() {
        let mut index = KeywordIndex::in_memory().unwrap();
        let tenant = TenantId::new("t1");
        index.insert(&tenant, &page_doc("c1", "Doc", "one")).unwrap();
        index.commit().unwrap();

        index.delete_tenant(&tenant);
        index.commit().unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_reopen_from_disk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kw");
        let tenant = TenantId::new("t1");

        {
            let mut index = KeywordIndex::new(path.clone()).unwrap();
            index.insert(&tenant, &page_doc("c1", "Test", "test document")).unwrap();
            index.commit().unwrap();
        }

        let index = KeywordIndex::new(path).unwrap();
        let results = index.search(&tenant, &terms("test"), 10).unwrap();
        assert_eq!(results.len(), 1);
    }
}
