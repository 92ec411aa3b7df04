//! Retrievers: one per query shape, each failure-isolated.
//!
//! | Retriever | Backend | Source tag |
//! |-----------|---------|------------|
//! | [`TemporalRetriever`] | vector (date-ranged) + content store | `vector` / `content_store` |
//! | [`SemanticRetriever`] | vector + lexical, RRF-fused | `vector` / `lexical` |
//! | [`MemoryRetriever`] | vector, `source_type = "memory"` | `memory` |
//! | [`ContentRetriever`] | content store full-text | `content_store` |
//!
//! Implementations provide [`Retriever::search`], which may fail. Callers
//! use [`Retriever::retrieve`], which never does: an error is logged and
//! becomes an empty list, so one broken source never aborts a query.

mod content;
mod memory;
mod semantic;
mod temporal;

pub use content::ContentRetriever;
pub use memory::MemoryRetriever;
pub use semantic::SemanticRetriever;
pub use temporal::TemporalRetriever;

use async_trait::async_trait;

use context_recall_core::error::Result;
use context_recall_core::filter::Filter;
use context_recall_core::models::{keys, QueryAnalysis, RetrievalRequest, RetrievalResult};

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    /// Run the search; errors propagate.
    async fn search(
        &self,
        request: &RetrievalRequest,
        analysis: &QueryAnalysis,
    ) -> Result<Vec<RetrievalResult>>;

    /// Fail-open wrapper around [`Retriever::search`].
    async fn retrieve(
        &self,
        request: &RetrievalRequest,
        analysis: &QueryAnalysis,
    ) -> Vec<RetrievalResult> {
        match self.search(request, analysis).await {
            Ok(results) => {
                tracing::debug!(retriever = self.name(), results = results.len(), "retriever done");
                results
            }
            Err(e) => {
                tracing::warn!(
                    retriever = self.name(),
                    error = %e,
                    "retriever failed; returning no results"
                );
                Vec::new()
            }
        }
    }
}

/// How many candidates a retriever fetches for a request.
pub(crate) fn candidate_limit(request: &RetrievalRequest, multiplier: usize) -> usize {
    request.max_results.max(1).saturating_mul(multiplier.max(1))
}

/// Source types to restrict to: the analysis wins over the request.
pub(crate) fn source_filter<'a>(
    request: &'a RetrievalRequest,
    analysis: &'a QueryAnalysis,
) -> Option<&'a [String]> {
    analysis
        .source_filter
        .as_deref()
        .or(request.source_types.as_deref())
        .filter(|s| !s.is_empty())
}

/// Owner scope (user, optional app) plus optional source restriction.
pub(crate) fn scope_clauses(request: &RetrievalRequest, sources: Option<&[String]>) -> Vec<Filter> {
    let mut clauses = vec![Filter::eq(keys::USER_ID, request.user_id.as_str())];
    if let Some(app_id) = &request.app_id {
        clauses.push(Filter::eq(keys::APP_ID, app_id.as_str()));
    }
    if let Some(sources) = sources {
        clauses.push(Filter::any_of(
            keys::SOURCE_TYPE,
            sources.iter().map(String::as_str),
        ));
    }
    clauses
}
