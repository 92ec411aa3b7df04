//! Durable memory retrieval.
//!
//! Memories live in the same collection as raw content, stamped
//! `source_type = "memory"`. Source filters from the request do not apply
//! here: a memory is always in scope for its owner.

use std::sync::Arc;

use async_trait::async_trait;

use context_recall_core::error::Result;
use context_recall_core::filter::Filter;
use context_recall_core::models::{
    keys, QueryAnalysis, ResultSource, RetrievalRequest, RetrievalResult, MEMORY_SOURCE_TYPE,
};

use super::{candidate_limit, scope_clauses, Retriever};
use crate::vector_store::VectorStoreGateway;

pub struct MemoryRetriever {
    vectors: Arc<VectorStoreGateway>,
    candidate_multiplier: usize,
}

impl MemoryRetriever {
    pub fn new(vectors: Arc<VectorStoreGateway>, candidate_multiplier: usize) -> Self {
        Self {
            vectors,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl Retriever for MemoryRetriever {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        request: &RetrievalRequest,
        _analysis: &QueryAnalysis,
    ) -> Result<Vec<RetrievalResult>> {
        let mut clauses = scope_clauses(request, None);
        clauses.push(Filter::eq(keys::SOURCE_TYPE, MEMORY_SOURCE_TYPE));
        let filter = Filter::all(clauses);
        let limit = candidate_limit(request, self.candidate_multiplier);

        let mut results = self
            .vectors
            .query(&request.query, filter.as_ref(), limit)
            .await;
        for result in &mut results {
            result.source = ResultSource::Memory;
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::vector_store::VectorDocument;
    use context_recall_core::embedding::HashEmbeddingProvider;
    use context_recall_core::models::Metadata;
    use context_recall_core::store::memory::InMemoryBackend;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_only_memories_tagged_memory() {
        let backend = Arc::new(InMemoryBackend::new());
        let embedder = Arc::new(Embedder::with_limits(
            Arc::new(HashEmbeddingProvider::new(16)),
            500,
            100,
            Duration::ZERO,
        ));
        let vectors = Arc::new(VectorStoreGateway::new(backend, "c", embedder, 300));
        let docs = [
            ("m1", "memory", "prefers dark roast coffee"),
            ("t1", "twitter", "coffee tasting thread"),
        ]
        .iter()
        .map(|(id, source, text)| {
            let mut metadata = Metadata::new();
            metadata.insert(keys::USER_ID.into(), json!("u1"));
            metadata.insert(keys::SOURCE_TYPE.into(), json!(source));
            VectorDocument {
                id: id.to_string(),
                text: text.to_string(),
                metadata,
                embedding: None,
            }
        })
        .collect();
        vectors.upsert(docs).await.unwrap();

        let mut request = RetrievalRequest::new("coffee", "u1");
        request.source_types = Some(vec!["twitter".into()]);
        let results = MemoryRetriever::new(vectors, 2)
            .search(&request, &QueryAnalysis::default())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "m1");
        assert_eq!(results[0].source, ResultSource::Memory);
        assert_eq!(results[0].result_type.as_deref(), Some(MEMORY_SOURCE_TYPE));
    }
}
