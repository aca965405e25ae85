use crate::config::{parse_duration, Config};
use crate::error::{Result, TenantSearchError, ValidationError};
use crate::retrieval::{SearchMethod, MAX_LIMIT};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem found
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_tenants(config, &mut errors);
        Self::validate_ranking(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TenantSearchError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.data_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.data_dir",
                "Data directory cannot be empty",
            ));
        }

        if config.storage.tenant_db.trim().is_empty() {
            errors.push(ValidationError::new(
                "storage.tenant_db",
                "Tenant database file name cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.cache_capacity == 0 {
            errors.push(ValidationError::new(
                "embedding.cache_capacity",
                "Cache capacity must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let positive = [
            ("indexing.vector_dim", config.indexing.vector_dim),
            ("indexing.hnsw_ef_construction", config.indexing.hnsw_ef_construction),
            ("indexing.hnsw_m", config.indexing.hnsw_m),
            ("indexing.hnsw_ef_search", config.indexing.hnsw_ef_search),
            ("indexing.max_elements", config.indexing.max_elements),
        ];
        for (path, value) in positive {
            if value == 0 {
                errors.push(ValidationError::new(path, "Value must be greater than 0"));
            }
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if search.default_limit == 0 || search.default_limit > MAX_LIMIT {
            errors.push(ValidationError::new(
                "search.default_limit",
                format!("Default limit must be between 1 and {}", MAX_LIMIT),
            ));
        }

        if !(0.0..=1.0).contains(&search.default_threshold) {
            errors.push(ValidationError::new(
                "search.default_threshold",
                format!(
                    "Threshold must be between 0.0 and 1.0, got {}",
                    search.default_threshold
                ),
            ));
        }

        if !(0.0..=1.0).contains(&search.fallback_max_similarity) {
            errors.push(ValidationError::new(
                "search.fallback_max_similarity",
                format!(
                    "Fallback similarity ceiling must be between 0.0 and 1.0, got {}",
                    search.fallback_max_similarity
                ),
            ));
        }

        if search.strategies.is_empty() {
            errors.push(ValidationError::new(
                "search.strategies",
                "At least one strategy must be enabled",
            ));
        }
        for name in &search.strategies {
            if SearchMethod::from_name(name).is_none() {
                errors.push(ValidationError::new(
                    "search.strategies",
                    format!(
                        "Strategy must be one of [\"keyword\", \"vector\", \"fallback\"], got '{}'",
                        name
                    ),
                ));
            }
        }

        if search.keyword_candidate_multiplier == 0 {
            errors.push(ValidationError::new(
                "search.keyword_candidate_multiplier",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if search.cache_capacity == 0 {
            errors.push(ValidationError::new(
                "search.cache_capacity",
                "Cache capacity must be greater than 0",
            ));
        }

        if parse_duration(&search.cache_ttl).is_none() {
            errors.push(ValidationError::new(
                "search.cache_ttl",
                format!("Invalid duration format: {}", search.cache_ttl),
            ));
        }
    }

    fn validate_tenants(config: &Config, errors: &mut Vec<ValidationError>) {
        if parse_duration(&config.tenants.negative_ttl).is_none() {
            errors.push(ValidationError::new(
                "tenants.negative_ttl",
                format!("Invalid duration format: {}", config.tenants.negative_ttl),
            ));
        }
    }

    fn validate_ranking(config: &Config, errors: &mut Vec<ValidationError>) {
        let ranking = &config.ranking;
        let weights = [
            ("ranking.semantic", ranking.semantic),
            ("ranking.keyword", ranking.keyword),
            ("ranking.stock", ranking.stock),
            ("ranking.price", ranking.price),
            ("ranking.popularity", ranking.popularity),
            ("ranking.recency", ranking.recency),
            ("ranking.agreement_bonus", ranking.agreement_bonus),
        ];
        for (path, value) in weights {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be a non-negative number, got {}", value),
                ));
            }
        }

        if ranking.weights().total() <= 0.0 {
            errors.push(ValidationError::new(
                "ranking",
                "At least one ranking weight must be positive",
            ));
        }

        if !ranking.recency_half_life_days.is_finite() || ranking.recency_half_life_days <= 0.0 {
            errors.push(ValidationError::new(
                "ranking.recency_half_life_days",
                "Half-life must be greater than 0",
            ));
        }
    }
}
