//! Retrieval orchestration.
//!
//! ```text
//! request ─▶ analyze ─┬─ temporal ─┐
//!                     ├─ semantic ─┤
//!                     ├─ memory   ─┼─▶ merge (dedup, sort, cap) ─▶ partition ─▶ response
//!                     └─ content  ─┘
//! ```
//!
//! Every registered retriever runs concurrently under its own deadline. A
//! retriever that errors, panics, or misses the deadline contributes
//! nothing; the rest of the response is unaffected. A request never fails
//! because of a retriever.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::FutureExt;

use context_recall_core::merge::{merge_results, partition_by_source};
use context_recall_core::models::{RetrievalRequest, RetrievalResponse, RetrievalResult};

use crate::query_analysis::{QueryAnalyzer, RequestAnalyzer};
use crate::retriever::Retriever;

pub struct RetrievalOrchestrator {
    retrievers: Vec<Arc<dyn Retriever>>,
    analyzer: Arc<dyn QueryAnalyzer>,
    retriever_timeout: Duration,
}

impl RetrievalOrchestrator {
    pub fn new(retriever_timeout: Duration) -> Self {
        Self {
            retrievers: Vec::new(),
            analyzer: Arc::new(RequestAnalyzer),
            retriever_timeout,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn register(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retrievers.push(retriever);
        self
    }

    pub fn retriever_names(&self) -> Vec<&str> {
        self.retrievers.iter().map(|r| r.name()).collect()
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> RetrievalResponse {
        let started = Instant::now();
        let analysis = self.analyzer.analyze(request).await;

        let runs = self.retrievers.iter().map(|retriever| {
            let analysis = &analysis;
            async move {
                let run = AssertUnwindSafe(retriever.retrieve(request, analysis)).catch_unwind();
                match tokio::time::timeout(self.retriever_timeout, run).await {
                    Ok(Ok(results)) => results,
                    Ok(Err(panic)) => {
                        tracing::error!(
                            retriever = retriever.name(),
                            panic = panic_message(panic.as_ref()),
                            "retriever panicked; returning no results"
                        );
                        Vec::<RetrievalResult>::new()
                    }
                    Err(_) => {
                        tracing::warn!(
                            retriever = retriever.name(),
                            timeout_ms = self.retriever_timeout.as_millis() as u64,
                            "retriever timed out; returning no results"
                        );
                        Vec::new()
                    }
                }
            }
        });
        let lists = join_all(runs).await;

        let results = merge_results(lists, request.max_results);
        let (memories, content) = partition_by_source(&results);
        let processing_time_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            user = %request.user_id,
            results = results.len(),
            memories = memories.len(),
            elapsed_ms = processing_time_ms,
            "retrieval complete"
        );

        RetrievalResponse {
            total_results: results.len(),
            results,
            memories,
            content,
            processing_time_ms,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
