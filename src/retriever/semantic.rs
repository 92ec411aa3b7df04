//! Meaning-based retrieval over the vector store, fused with lexical
//! matches when enabled.

use std::sync::Arc;

use async_trait::async_trait;

use context_recall_core::error::Result;
use context_recall_core::filter::Filter;
use context_recall_core::models::{QueryAnalysis, RetrievalRequest, RetrievalResult};

use super::{candidate_limit, scope_clauses, source_filter, Retriever};
use crate::hybrid::HybridSearcher;
use crate::vector_store::VectorStoreGateway;

pub struct SemanticRetriever {
    searcher: HybridSearcher,
    candidate_multiplier: usize,
}

impl SemanticRetriever {
    pub fn new(
        vectors: Arc<VectorStoreGateway>,
        include_lexical: bool,
        candidate_multiplier: usize,
    ) -> Self {
        let searcher = if include_lexical {
            HybridSearcher::new(vectors)
        } else {
            HybridSearcher::vector_only(vectors)
        };
        Self {
            searcher,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl Retriever for SemanticRetriever {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn search(
        &self,
        request: &RetrievalRequest,
        analysis: &QueryAnalysis,
    ) -> Result<Vec<RetrievalResult>> {
        let filter = Filter::all(scope_clauses(request, source_filter(request, analysis)));
        let limit = candidate_limit(request, self.candidate_multiplier);
        Ok(self
            .searcher
            .search(&request.query, filter.as_ref(), limit)
            .await)
    }
}
