//! Hybrid search: vector and lexical queries run concurrently, then fused
//! with Reciprocal Rank Fusion.
//!
//! ```text
//! query ──┬── vector query (fail-open) ───┐
//!         └── lexical query (fail-open) ──┴── hybrid_merge (RRF, k = 60) ── top_k
//! ```
//!
//! Both branches are awaited before merging. See
//! [`context_recall_core::fusion`] for the fusion rules.

use std::sync::Arc;

use context_recall_core::filter::Filter;
use context_recall_core::fusion::hybrid_merge;
use context_recall_core::models::RetrievalResult;

use crate::lexical::LexicalSearchGateway;
use crate::vector_store::VectorStoreGateway;

pub struct HybridSearcher {
    vectors: Arc<VectorStoreGateway>,
    lexical: Option<LexicalSearchGateway>,
}

impl HybridSearcher {
    /// Vector plus lexical search.
    pub fn new(vectors: Arc<VectorStoreGateway>) -> Self {
        let lexical = LexicalSearchGateway::new(vectors.clone());
        Self {
            vectors,
            lexical: Some(lexical),
        }
    }

    /// Vector search only.
    pub fn vector_only(vectors: Arc<VectorStoreGateway>) -> Self {
        Self {
            vectors,
            lexical: None,
        }
    }

    pub async fn search(
        &self,
        query: &str,
        filter: Option<&Filter>,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        let vector = self.vectors.query(query, filter, top_k);
        let lexical = async {
            let Some(lexical) = &self.lexical else {
                return Vec::new();
            };
            lexical
                .search(query, filter, top_k)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "lexical search failed; using vector results only");
                    Vec::new()
                })
        };

        let (vector, lexical) = tokio::join!(vector, lexical);
        tracing::debug!(
            vector = vector.len(),
            lexical = lexical.len(),
            "fusing hybrid results"
        );
        hybrid_merge(vector, lexical, top_k)
    }
}
