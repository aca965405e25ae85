use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, KeywordIndexError, VectorIndexError};

/// Main error type for tenant-search
#[derive(Error, Debug)]
pub enum TenantSearchError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Malformed search input. The only failure `search` surfaces to callers.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A single retrieval strategy failed
    #[error("Strategy {strategy} failed: {message}")]
    Strategy { strategy: String, message: String },

    /// Search result cache backend could not be reached
    #[error("Search cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Tenant domain store errors
    #[error("Domain store error: {0}")]
    DomainStore(String),

    /// Embedding errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Keyword index errors
    #[error(transparent)]
    KeywordIndex(#[from] KeywordIndexError),

    /// Vector index errors
    #[error(transparent)]
    VectorIndex(#[from] VectorIndexError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TenantSearchError {
    pub fn strategy(strategy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            strategy: strategy.into(),
            message: message.into(),
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for tenant-search operations
pub type Result<T> = std::result::Result<T, TenantSearchError>;
