//! Lexical search gateway: "document contains" queries against the vector
//! collection, no embedding required.
//!
//! Results carry no relevance score since a substring match is
//! presence-only. Errors propagate; callers decide how to degrade.

use std::sync::Arc;

use context_recall_core::error::Result;
use context_recall_core::filter::Filter;
use context_recall_core::models::{ResultSource, RetrievalResult};

use crate::vector_store::VectorStoreGateway;

pub struct LexicalSearchGateway {
    vectors: Arc<VectorStoreGateway>,
}

impl LexicalSearchGateway {
    pub fn new(vectors: Arc<VectorStoreGateway>) -> Self {
        Self { vectors }
    }

    pub async fn search(
        &self,
        text: &str,
        filter: Option<&Filter>,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let needle = text.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let collection = self.vectors.collection().await?;
        let response = collection.get(needle, filter, limit).await?;
        Ok(response.into_results(ResultSource::Lexical))
    }
}
