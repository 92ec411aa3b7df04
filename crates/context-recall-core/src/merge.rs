//! Orchestrator-level merging of per-retriever result lists.

use std::collections::HashMap;

use crate::models::{ResultSource, RetrievalResult, MEMORY_SOURCE_TYPE};

/// Deduplicate by id keeping the highest-scoring copy, sort by score
/// descending, and cap at `max_results`.
///
/// Unscored results rank as zero. Ties keep first-seen order.
pub fn merge_results(
    lists: impl IntoIterator<Item = Vec<RetrievalResult>>,
    max_results: usize,
) -> Vec<RetrievalResult> {
    let mut merged: Vec<RetrievalResult> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for result in lists.into_iter().flatten() {
        match positions.get(&result.id) {
            Some(&pos) => {
                if result.rank_score() > merged[pos].rank_score() {
                    merged[pos] = result;
                }
            }
            None => {
                positions.insert(result.id.clone(), merged.len());
                merged.push(result);
            }
        }
    }

    merged.sort_by(|a, b| {
        b.rank_score()
            .partial_cmp(&a.rank_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(max_results);
    merged
}

/// True for results that came from durable memory, whichever retriever
/// found them.
pub fn is_memory(result: &RetrievalResult) -> bool {
    result.source == ResultSource::Memory
        || result.result_type.as_deref() == Some(MEMORY_SOURCE_TYPE)
}

/// Split results into (durable memories, raw content), preserving order.
pub fn partition_by_source(
    results: &[RetrievalResult],
) -> (Vec<RetrievalResult>, Vec<RetrievalResult>) {
    results.iter().cloned().partition(is_memory)
}
