//! Reciprocal Rank Fusion of vector and lexical result lists.
//!
//! Cosine similarity and presence-only matches live on incompatible
//! scales, so the two lists are merged purely by rank position:
//!
//! ```text
//! fused(id) = Σ over lists containing id of 1 / (k + rank)      rank is 1-indexed
//! ```
//!
//! with `k = 60`. When an id appears in both lists, the vector copy's
//! content, metadata, and timestamp win since vector results carry the
//! richer fields.

use std::collections::HashMap;

use crate::models::RetrievalResult;

/// RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// A result paired with its fused score. Internal to ranking; callers
/// outside this module receive plain [`RetrievalResult`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult {
    pub result: RetrievalResult,
    pub fused_score: f64,
}

/// Fuse two ranked lists with RRF, returning at most `top_k` entries
/// sorted by fused score (ties keep first-seen order).
pub fn reciprocal_rank_fusion(
    vector: Vec<RetrievalResult>,
    lexical: Vec<RetrievalResult>,
    top_k: usize,
) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::with_capacity(vector.len() + lexical.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for list in [vector, lexical] {
        for (i, result) in list.into_iter().enumerate() {
            let contribution = 1.0 / (RRF_K + (i + 1) as f64);
            match positions.get(&result.id) {
                Some(&pos) => fused[pos].fused_score += contribution,
                None => {
                    positions.insert(result.id.clone(), fused.len());
                    fused.push(FusedResult {
                        result,
                        fused_score: contribution,
                    });
                }
            }
        }
    }

    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);
    fused
}

/// Hybrid merge used by the search path.
///
/// If either list is empty the other is returned unchanged; otherwise the
/// lists are RRF-fused, capped at `top_k`, and the fusion score is dropped.
pub fn hybrid_merge(
    vector: Vec<RetrievalResult>,
    lexical: Vec<RetrievalResult>,
    top_k: usize,
) -> Vec<RetrievalResult> {
    if vector.is_empty() {
        return lexical;
    }
    if lexical.is_empty() {
        return vector;
    }
    reciprocal_rank_fusion(vector, lexical, top_k)
        .into_iter()
        .map(|f| f.result)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, ResultSource};
    use serde_json::json;

    fn vector_hit(id: &str, score: f64) -> RetrievalResult {
        let mut meta = Metadata::new();
        meta.insert("origin".into(), json!("vector"));
        RetrievalResult::from_metadata(
            id,
            format!("vector {}", id),
            Some(score),
            ResultSource::Vector,
            meta,
        )
    }

    fn lexical_hit(id: &str) -> RetrievalResult {
        let mut meta = Metadata::new();
        meta.insert("origin".into(), json!("lexical"));
        RetrievalResult::from_metadata(
            id,
            format!("lexical {}", id),
            None,
            ResultSource::Lexical,
            meta,
        )
    }

    #[test]
    fn test_disjoint_lists_keep_every_result() {
        let v = vec![vector_hit("a", 0.9), vector_hit("b", 0.8), vector_hit("c", 0.7)];
        let l = vec![lexical_hit("x"), lexical_hit("y")];
        let fused = reciprocal_rank_fusion(v, l, 100);
        assert_eq!(fused.len(), 5);

        let score = |id: &str| {
            fused
                .iter()
                .find(|f| f.result.id == id)
                .map(|f| f.fused_score)
        };
        assert_eq!(score("a"), Some(1.0 / 61.0));
        assert_eq!(score("c"), Some(1.0 / 63.0));
        assert_eq!(score("x"), Some(1.0 / 61.0));
        assert_eq!(score("y"), Some(1.0 / 62.0));
    }

    #[test]
    fn test_shared_top_rank_wins() {
        let v = vec![vector_hit("same", 0.5), vector_hit("v2", 0.4)];
        let l = vec![lexical_hit("same"), lexical_hit("l2")];
        let fused = reciprocal_rank_fusion(v, l, 10);
        assert_eq!(fused[0].result.id, "same");
        assert!(fused[0].fused_score > fused[1].fused_score);
        assert!((fused[0].fused_score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_vector_copy_preferred_for_shared_ids() {
        let fused =
            reciprocal_rank_fusion(vec![vector_hit("s", 0.3)], vec![lexical_hit("s")], 10);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].result.content, "vector s");
        assert_eq!(fused[0].result.metadata["origin"], "vector");
    }

    #[test]
    fn test_five_and_five_sharing_two() {
        let v: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .enumerate()
            .map(|(i, id)| vector_hit(id, 1.0 - i as f64 * 0.1))
            .collect();
        let l: Vec<_> = ["c", "x", "a", "y", "z"]
            .iter()
            .map(|id| lexical_hit(id))
            .collect();
        let fused = reciprocal_rank_fusion(v, l, 20);
        assert_eq!(fused.len(), 8);

        let score = |id: &str| {
            fused
                .iter()
                .find(|f| f.result.id == id)
                .unwrap()
                .fused_score
        };
        // a: vector rank 1, lexical rank 3
        assert!(score("a") > 1.0 / 61.0);
        // c: vector rank 3, lexical rank 1
        assert!(score("c") > 1.0 / 61.0);
        assert!(score("c") > 1.0 / 63.0);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let v = vec![vector_hit("a", 0.9), vector_hit("b", 0.8)];
        let l = vec![lexical_hit("c"), lexical_hit("d")];
        assert_eq!(reciprocal_rank_fusion(v, l, 3).len(), 3);
    }

    #[test]
    fn test_hybrid_merge_passes_through_single_list() {
        let l = vec![lexical_hit("x"), lexical_hit("y")];
        let merged = hybrid_merge(Vec::new(), l.clone(), 1);
        assert_eq!(merged, l);

        let v = vec![vector_hit("a", 0.9)];
        assert_eq!(hybrid_merge(v.clone(), Vec::new(), 10), v);
    }

    #[test]
    fn test_hybrid_merge_orders_by_fused_rank() {
        let v = vec![vector_hit("a", 0.9), vector_hit("b", 0.8)];
        let l = vec![lexical_hit("b"), lexical_hit("c")];
        let ids: Vec<_> = hybrid_merge(v, l, 10).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
