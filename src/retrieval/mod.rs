//! Retrieval & Ranking
//!
//! Tiered retrieval (keyword, vector, fallback) behind a result cache,
//! followed by product/content consolidation and composite ranking.

pub mod cache;
pub mod consolidate;
pub mod grouping;
pub mod orchestrator;
pub mod ranking;
pub mod strategy;
mod types;

pub use cache::{CacheKey, CachedResults, InMemorySearchCache, SearchCache, SearchCacheStats};
pub use consolidate::{consolidate, Consolidation, EnrichedProduct, MatchKind};
pub use grouping::{group_by_chunk, ChunkGroup};
pub use orchestrator::{
    OrchestratorBuilder, ResponseSource, MAX_LIMIT, SearchOrchestrator, SearchOutcome, StrategyReport,
    StrategyStatus,
};
pub use ranking::{
    RankOptions, RankedResult, Ranker, RankingSignals, RankingWeights, ResultItem, WeightOverrides,
};
pub use strategy::{FallbackStrategy, KeywordStrategy, SearchStrategy, StrategyOutcome, VectorStrategy};
pub use types::{clamp_unit, CandidateKind, ContentCandidate, SearchMethod, SearchOptions, SearchQuery};
