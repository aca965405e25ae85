//! Group ranked page hits by the chunk of the page they came from

use crate::retrieval::ranking::RankedResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Results sharing one chunk index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkGroup {
    pub chunk_index: u32,
    pub results: Vec<RankedResult>,
    /// Mean similarity of the group's results
    pub average_similarity: f32,
}

/// Group results by chunk index, ascending. Results without a chunk index
/// (plain products) are left out.
pub fn group_by_chunk(results: &[RankedResult]) -> Vec<ChunkGroup> {
    let mut groups: BTreeMap<u32, Vec<RankedResult>> = BTreeMap::new();
    for result in results {
        if let Some(chunk_index) = result.item.chunk_index() {
            groups.entry(chunk_index).or_default().push(result.clone());
        }
    }

    groups
        .into_iter()
        .map(|(chunk_index, results)| {
            let total: f32 = results.iter().map(|r| r.item.similarity()).sum();
            let average_similarity = total / results.len() as f32;
            ChunkGroup {
                chunk_index,
                results,
                average_similarity,
            }
        })
        .collect()
}
