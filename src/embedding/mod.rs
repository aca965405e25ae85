//! Embedding & Indexing
//!
//! - `EmbeddingProvider` trait for abstraction, `FastEmbedProvider` for local models
//! - `EmbeddingGate` for cached, single-flight access to a provider
//! - HNSW for tenant-scoped vector similarity search
//! - Tantivy for tenant-scoped keyword search
mod gate;
mod keyword_index;
mod provider;
mod vector_index;

pub use gate::{normalize_for_embedding, Embedding, EmbeddingGate, GateStats};
pub use keyword_index::{KeywordDocument, KeywordIndex, KeywordIndexError, KeywordSearchResult};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, SUPPORTED_MODELS};
pub use vector_index::{HnswParams, HnswVectorStore, VectorIndexError, VectorStore};
