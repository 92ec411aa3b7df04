//! Query analysis seam.
//!
//! Interpreting free text ("what did I tweet last week") into a time
//! window and source list happens upstream. The orchestrator only asks a
//! [`QueryAnalyzer`] for the structured result; [`RequestAnalyzer`] lifts
//! the fields a caller already supplied on the request.

use async_trait::async_trait;

use context_recall_core::models::{QueryAnalysis, RetrievalRequest};

#[async_trait]
pub trait QueryAnalyzer: Send + Sync {
    async fn analyze(&self, request: &RetrievalRequest) -> QueryAnalysis;
}

/// Uses the request's own temporal constraint and source types.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestAnalyzer;

#[async_trait]
impl QueryAnalyzer for RequestAnalyzer {
    async fn analyze(&self, request: &RetrievalRequest) -> QueryAnalysis {
        QueryAnalysis {
            temporal_constraint: request.temporal_constraint.clone(),
            source_filter: request
                .source_types
                .clone()
                .filter(|sources| !sources.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use context_recall_core::models::TemporalConstraint;

    #[tokio::test]
    async fn test_lifts_request_fields() {
        let mut request = RetrievalRequest::new("q", "u");
        assert_eq!(RequestAnalyzer.analyze(&request).await, QueryAnalysis::default());

        request.temporal_constraint = Some(TemporalConstraint {
            start_date: Some(Utc::now()),
            end_date: None,
            recency: true,
        });
        request.source_types = Some(Vec::new());
        let analysis = RequestAnalyzer.analyze(&request).await;
        assert!(analysis.temporal_constraint.is_some_and(|c| c.recency));
        assert_eq!(analysis.source_filter, None);
    }
}
