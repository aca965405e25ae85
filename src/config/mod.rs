//! Configuration management for tenant-search
//!
//! TOML file at `<config dir>/tenant-search/config.toml`, overridable per key
//! through `TENANT_SEARCH_<SECTION>__<KEY>` environment variables and validated
//! as a whole before use.

use crate::error::{Result, TenantSearchError};
use crate::retrieval::{RankingWeights, SearchMethod};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

const ENV_PREFIX: &str = "TENANT_SEARCH_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub tenants: TenantsConfig,
    pub ranking: RankingConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Tenant domain database, relative to `data_dir`
    pub tenant_db: String,
    /// Keyword index directory, relative to `data_dir`; held in memory when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_index: Option<String>,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    /// Vectors kept by the embedding gate
    pub cache_capacity: usize,
}

/// Indexing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub vector_dim: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_search: usize,
    pub max_elements: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub default_threshold: f32,
    /// Strategy order: any of "keyword", "vector", "fallback"
    pub strategies: Vec<String>,
    pub fallback_max_similarity: f32,
    pub keyword_candidate_multiplier: usize,
    pub cache_capacity: usize,
    pub cache_ttl: String,
}

/// Domain resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantsConfig {
    /// How long an unknown domain stays cached as unknown
    pub negative_ttl: String,
}

/// Ranking weights and modifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    pub semantic: f64,
    pub keyword: f64,
    pub stock: f64,
    pub price: f64,
    pub popularity: f64,
    pub recency: f64,
    pub agreement_bonus: f64,
    pub recency_half_life_days: f64,
}

impl RankingConfig {
    pub fn weights(&self) -> RankingWeights {
        RankingWeights {
            semantic: self.semantic,
            keyword: self.keyword,
            stock: self.stock,
            price: self.price,
            popularity: self.popularity,
            recency: self.recency,
        }
    }
}

impl SearchConfig {
    /// Configured strategy order; unknown names are skipped
    pub fn strategy_order(&self) -> Vec<SearchMethod> {
        let mut order = Vec::new();
        for method in self.strategies.iter().filter_map(|s| SearchMethod::from_name(s)) {
            if !order.contains(&method) {
                order.push(method);
            }
        }
        order
    }

    pub fn cache_ttl(&self) -> Result<Duration> {
        parse_duration(&self.cache_ttl).ok_or_else(|| TenantSearchError::InvalidConfigValue {
            path: "search.cache_ttl".to_string(),
            message: format!("Invalid duration format: {}", self.cache_ttl),
        })
    }
}

impl TenantsConfig {
    pub fn negative_ttl(&self) -> Result<Duration> {
        parse_duration(&self.negative_ttl).ok_or_else(|| TenantSearchError::InvalidConfigValue {
            path: "tenants.negative_ttl".to_string(),
            message: format!("Invalid duration format: {}", self.negative_ttl),
        })
    }
}

/// Parse durations like "30s", "5m", "1h" or plain seconds
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (number, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = number.parse().ok()?;
    let seconds = match unit {
        "s" => value,
        "m" => value.checked_mul(60)?,
        "h" => value.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(seconds))
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TenantSearchError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| TenantSearchError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TenantSearchError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: TENANT_SEARCH_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    fn apply_overrides(&mut self, vars: impl Iterator<Item = (String, String)>) {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix(ENV_PREFIX) {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!(key = %key, error = %e, "Failed to apply env override");
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "STORAGE__KEYWORD_INDEX" => {
                self.storage.keyword_index = Some(value.trim().to_string()).filter(|v| !v.is_empty())
            }
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "EMBEDDING__CACHE_CAPACITY" => self.embedding.cache_capacity = parse_value(path, value)?,
            "SEARCH__DEFAULT_LIMIT" => self.search.default_limit = parse_value(path, value)?,
            "SEARCH__DEFAULT_THRESHOLD" => self.search.default_threshold = parse_value(path, value)?,
            "SEARCH__STRATEGIES" => {
                self.search.strategies = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "SEARCH__CACHE_CAPACITY" => self.search.cache_capacity = parse_value(path, value)?,
            "SEARCH__CACHE_TTL" => self.search.cache_ttl = value.to_string(),
            "TENANTS__NEGATIVE_TTL" => self.tenants.negative_ttl = value.to_string(),
            _ => {
                tracing::debug!(key = %path, "Unknown env config key");
            }
        }
        Ok(())
    }

    /// Tenant database path, relative to the data directory unless absolute
    pub fn tenant_db_path(&self) -> Result<PathBuf> {
        Ok(expand_tilde(&self.storage.data_dir)?.join(&self.storage.tenant_db))
    }

    /// On-disk keyword index directory, `None` for an in-memory index
    pub fn keyword_index_path(&self) -> Result<Option<PathBuf>> {
        match &self.storage.keyword_index {
            Some(dir) => Ok(Some(expand_tilde(&self.storage.data_dir)?.join(dir))),
            None => Ok(None),
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            TenantSearchError::Config("Cannot determine config directory".to_string())
        })?;

        Ok(config_dir.join("tenant-search").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            TenantSearchError::Config("Cannot determine home directory".to_string())
        })?;

        Ok(home_dir.join(".tenant-search"))
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| TenantSearchError::Config("Invalid path encoding".to_string()))?;

    match path_str.strip_prefix("~/") {
        Some(stripped) => {
            let home = dirs::home_dir().ok_or_else(|| {
                TenantSearchError::Config("Cannot determine home directory".to_string())
            })?;
            Ok(home.join(stripped))
        }
        None => Ok(path.to_path_buf()),
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TenantSearchError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

impl Default for Config {
    fn default() -> Self {
        let weights = RankingWeights::default();

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.tenant-search"),
                tenant_db: "tenants.db".to_string(),
                keyword_index: None,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                batch_size: 32,
                cache_capacity: 10_000,
            },
            indexing: IndexingConfig {
                vector_dim: 384,
                hnsw_ef_construction: 200,
                hnsw_m: 16,
                hnsw_ef_search: 64,
                max_elements: 100_000,
            },
            search: SearchConfig {
                default_limit: 10,
                default_threshold: 0.15,
                strategies: vec![
                    "keyword".to_string(),
                    "vector".to_string(),
                    "fallback".to_string(),
                ],
                fallback_max_similarity: 0.5,
                keyword_candidate_multiplier: 2,
                cache_capacity: 1000,
                cache_ttl: "5m".to_string(),
            },
            tenants: TenantsConfig {
                negative_ttl: "60s".to_string(),
            },
            ranking: RankingConfig {
                semantic: weights.semantic,
                keyword: weights.keyword,
                stock: weights.stock,
                price: weights.price,
                popularity: weights.popularity,
                recency: weights.recency,
                agreement_bonus: 0.05,
                recency_half_life_days: 180.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.search.default_limit = 25;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.search.default_limit, 25);
        assert_eq!(loaded.meta.schema_version, "1.0.0");
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/tenant-search.toml"));
        assert!(matches!(result, Err(TenantSearchError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(
            vec![
                ("TENANT_SEARCH_SEARCH__STRATEGIES".to_string(), "vector, fallback".to_string()),
                ("TENANT_SEARCH_SEARCH__DEFAULT_LIMIT".to_string(), "3".to_string()),
                ("TENANT_SEARCH_SEARCH__DEFAULT_THRESHOLD".to_string(), "oops".to_string()),
                ("UNRELATED".to_string(), "1".to_string()),
            ]
            .into_iter(),
        );

        assert_eq!(
            config.search.strategy_order(),
            vec![SearchMethod::Vector, SearchMethod::Fallback]
        );
        assert_eq!(config.search.default_limit, 3);
        assert_eq!(config.search.default_threshold, 0.15);
    }

    #[test]
    fn test_keyword_index_path() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/var/lib/tenant-search");
        assert_eq!(config.keyword_index_path().unwrap(), None);

        config.apply_overrides(
            vec![("TENANT_SEARCH_STORAGE__KEYWORD_INDEX".to_string(), "keyword".to_string())]
                .into_iter(),
        );
        assert_eq!(
            config.keyword_index_path().unwrap(),
            Some(PathBuf::from("/var/lib/tenant-search/keyword"))
        );
    }

    #[test]
    fn test_expand_tilde() {
        let plain = Path::new("/var/lib/tenant-search");
        assert_eq!(expand_tilde(plain).unwrap(), plain);
        assert!(!expand_tilde(Path::new("~/x")).unwrap().starts_with("~"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration("m"), None);
    }

    #[test]
    fn test_strategy_order_skips_unknown_and_duplicates() {
        let mut config = Config::default();
        config.search.strategies = vec!["vector".into(), "magic".into(), "Vector".into(), "keyword".into()];
        assert_eq!(
            config.search.strategy_order(),
            vec![SearchMethod::Vector, SearchMethod::Keyword]
        );
    }
}
