//! tenant-search - Domain-scoped retrieval and ranking
//!
//! Resolves a storefront domain to its tenant, retrieves relevant pages and
//! products through tiered keyword, vector and fallback search, merges
//! products with the content describing them and ranks the result. Every
//! expensive step is cached per tenant.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod retrieval;
pub mod tenant;
pub mod text;

pub use error::{Result, TenantSearchError};
