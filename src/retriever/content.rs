//! Full-text retrieval over the durable content store.

use std::sync::Arc;

use async_trait::async_trait;

use context_recall_core::error::Result;
use context_recall_core::models::{QueryAnalysis, RetrievalRequest, RetrievalResult};
use context_recall_core::store::{ContentQuery, ContentStore};

use super::{candidate_limit, source_filter, Retriever};

pub struct ContentRetriever {
    content: Arc<dyn ContentStore>,
    candidate_multiplier: usize,
}

impl ContentRetriever {
    pub fn new(content: Arc<dyn ContentStore>, candidate_multiplier: usize) -> Self {
        Self {
            content,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl Retriever for ContentRetriever {
    fn name(&self) -> &str {
        "content"
    }

    async fn search(
        &self,
        request: &RetrievalRequest,
        analysis: &QueryAnalysis,
    ) -> Result<Vec<RetrievalResult>> {
        let query = ContentQuery {
            query: request.query.clone(),
            user_id: request.user_id.clone(),
            app_id: request.app_id.clone(),
            source_types: source_filter(request, analysis).map(<[String]>::to_vec),
            start: None,
            end: None,
            limit: candidate_limit(request, self.candidate_multiplier),
        };
        self.content.full_text_search(&query).await
    }
}
