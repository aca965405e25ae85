//! Retrieval tiers tried in sequence by the orchestrator
//!
//! Each tier answers either "not applicable to this query" or a (possibly
//! empty) list of candidates. Errors are left to the caller, which logs them
//! and treats the tier as having found nothing.

mod fallback;
mod keyword;
mod vector;

pub use fallback::FallbackStrategy;
pub use keyword::KeywordStrategy;
pub use vector::VectorStrategy;

use crate::error::Result;
use crate::retrieval::{ContentCandidate, SearchMethod, SearchQuery};
use crate::tenant::TenantId;
use async_trait::async_trait;

/// Result of running one tier
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    /// The query gives this tier nothing to work with
    NotApplicable,
    /// Candidates in descending similarity order, each tagged with its source
    Found(Vec<ContentCandidate>),
}

impl StrategyOutcome {
    pub fn candidates(&self) -> &[ContentCandidate] {
        match self {
            StrategyOutcome::NotApplicable => &[],
            StrategyOutcome::Found(candidates) => candidates,
        }
    }

    pub fn into_candidates(self) -> Vec<ContentCandidate> {
        match self {
            StrategyOutcome::NotApplicable => Vec::new(),
            StrategyOutcome::Found(candidates) => candidates,
        }
    }
}

/// One retrieval tier
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn method(&self) -> SearchMethod;

    async fn search(&self, tenant: &TenantId, query: &SearchQuery) -> Result<StrategyOutcome>;
}

fn sort_by_similarity(candidates: &mut [ContentCandidate]) {
    candidates.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_applicable_has_no_candidates() {
        assert!(StrategyOutcome::NotApplicable.candidates().is_empty());
        assert!(StrategyOutcome::NotApplicable.into_candidates().is_empty());
    }

    #[test]
    fn test_sort_by_similarity_descending() {
        let mut candidates = vec![
            ContentCandidate::page("a", "A", "https://s.com/a", "", None).with_similarity(0.2),
            ContentCandidate::page("b", "B", "https://s.com/b", "", None).with_similarity(0.9),
        ];
        sort_by_similarity(&mut candidates);
        assert_eq!(candidates[0].id, "b");
    }
}
