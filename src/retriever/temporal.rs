//! Time-bounded retrieval.
//!
//! Only active when the query analysis carries a temporal constraint; any
//! other query returns immediately without touching a backend. The vector
//! branch filters on the `created_at` metadata range and the content store
//! branch applies the same window in SQL. Both run concurrently and their
//! results are concatenated; the orchestrator deduplicates.
//!
//! A constraint flagged `recency` multiplies each score by its age factor
//! (see [`context_recall_core::recency`]).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use context_recall_core::error::Result;
use context_recall_core::filter::Filter;
use context_recall_core::models::{keys, QueryAnalysis, RetrievalRequest, RetrievalResult};
use context_recall_core::recency::apply_recency_boost;
use context_recall_core::store::{ContentQuery, ContentStore};

use super::{candidate_limit, scope_clauses, source_filter, Retriever};
use crate::vector_store::VectorStoreGateway;

pub struct TemporalRetriever {
    vectors: Arc<VectorStoreGateway>,
    content: Arc<dyn ContentStore>,
    candidate_multiplier: usize,
}

impl TemporalRetriever {
    pub fn new(
        vectors: Arc<VectorStoreGateway>,
        content: Arc<dyn ContentStore>,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            vectors,
            content,
            candidate_multiplier,
        }
    }
}

#[async_trait]
impl Retriever for TemporalRetriever {
    fn name(&self) -> &str {
        "temporal"
    }

    async fn search(
        &self,
        request: &RetrievalRequest,
        analysis: &QueryAnalysis,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(constraint) = &analysis.temporal_constraint else {
            return Ok(Vec::new());
        };

        let limit = candidate_limit(request, self.candidate_multiplier);
        let sources = source_filter(request, analysis);

        let mut clauses = scope_clauses(request, sources);
        if let Some(window) = Filter::range(
            keys::CREATED_AT,
            constraint.start_date.map(|d| d.timestamp() as f64),
            constraint.end_date.map(|d| d.timestamp() as f64),
        ) {
            clauses.push(window);
        }
        let filter = Filter::all(clauses);

        let content_query = ContentQuery {
            query: request.query.clone(),
            user_id: request.user_id.clone(),
            app_id: request.app_id.clone(),
            source_types: sources.map(<[String]>::to_vec),
            start: constraint.start_date,
            end: constraint.end_date,
            limit,
        };

        let vector = self.vectors.query(&request.query, filter.as_ref(), limit);
        let content = async {
            self.content
                .full_text_search(&content_query)
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        error = %e,
                        "temporal content search failed; using vector results only"
                    );
                    Vec::new()
                })
        };
        let (vector, content) = tokio::join!(vector, content);

        let mut results = vector;
        results.extend(content);
        if constraint.recency {
            apply_recency_boost(&mut results, Utc::now());
        }
        tracing::debug!(
            results = results.len(),
            recency = constraint.recency,
            "temporal retrieval"
        );
        Ok(results)
    }
}
