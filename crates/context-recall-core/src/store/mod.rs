//! Storage abstractions for Context Recall.
//!
//! Two backends sit behind the retrieval pipeline:
//!
//! - a **vector-capable document store** ([`VectorBackend`] /
//!   [`VectorCollection`]) holding chunk text, metadata, and embeddings;
//! - a **durable content store** ([`ContentStore`]) holding whole items
//!   with full-text relevance ranking.
//!
//! The vector collection speaks the wire shapes of a collection-oriented
//! store: [`QueryResponse`] is nested per query embedding while
//! [`GetResponse`] is flat. Both are normalized into [`RetrievalResult`]
//! by [`QueryResponse::into_results`] and [`GetResponse::into_results`]
//! so nothing above the gateway sees either shape.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Filter;
use crate::models::{keys, Metadata, ResultSource, RetrievalResult};

/// One record written to a vector collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub embedding: Vec<f32>,
}

/// Which records a delete call removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelector {
    Ids(Vec<String>),
    Where(Filter),
}

/// Nearest-neighbor response, one inner list per query embedding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub ids: Vec<Vec<String>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<Option<f32>>>>,
}

/// Filtered fetch response; flat arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub ids: Vec<String>,
    #[serde(default)]
    pub documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Option<Metadata>>>,
}

impl QueryResponse {
    /// Flatten every query batch into canonical results with
    /// `relevance_score = 1 - distance`.
    pub fn into_results(self, source: ResultSource) -> Vec<RetrievalResult> {
        let mut documents = self.documents.unwrap_or_default().into_iter();
        let mut metadatas = self.metadatas.unwrap_or_default().into_iter();
        let mut distances = self.distances.unwrap_or_default().into_iter();

        let mut results = Vec::new();
        for ids in self.ids {
            let docs = documents.next().unwrap_or_default();
            let metas = metadatas.next().unwrap_or_default();
            let dists = distances.next().unwrap_or_default();
            let score_at = |i: usize| dists.get(i).copied().flatten().map(|d| 1.0 - f64::from(d));
            results.extend(zip_row(ids, docs, metas, score_at, source));
        }
        results
    }
}

impl GetResponse {
    /// Convert into canonical results with no relevance score.
    pub fn into_results(self, source: ResultSource) -> Vec<RetrievalResult> {
        let docs = self.documents.unwrap_or_default();
        let metas = self.metadatas.unwrap_or_default();
        zip_row(self.ids, docs, metas, |_| None, source)
    }
}

fn zip_row(
    ids: Vec<String>,
    docs: Vec<Option<String>>,
    metas: Vec<Option<Metadata>>,
    score_at: impl Fn(usize) -> Option<f64>,
    source: ResultSource,
) -> Vec<RetrievalResult> {
    ids.into_iter()
        .enumerate()
        .map(|(i, id)| {
            let content = docs.get(i).cloned().flatten().unwrap_or_default();
            let metadata = metas.get(i).cloned().flatten().unwrap_or_default();
            RetrievalResult::from_metadata(id, content, score_at(i), source, metadata)
        })
        .collect()
}

/// A named collection in a vector-capable document store.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Insert or overwrite records by id.
    async fn upsert(&self, records: &[CollectionRecord]) -> Result<()>;

    /// Remove records by id list or metadata filter.
    async fn delete(&self, selector: &DeleteSelector) -> Result<()>;

    /// Nearest-neighbor search, one result list per query embedding.
    async fn query(
        &self,
        query_embeddings: &[Vec<f32>],
        filter: Option<&Filter>,
        n_results: usize,
    ) -> Result<QueryResponse>;

    /// Records whose document contains `text`, filtered by metadata.
    async fn get(&self, text: &str, filter: Option<&Filter>, limit: usize) -> Result<GetResponse>;
}

/// Connection to a vector-capable document store.
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Fetch the named collection, creating it if needed.
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn VectorCollection>>;
}

/// A whole ingested item in the durable content store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub user_id: String,
    pub app_id: String,
    pub source_type: String,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ContentItem {
    /// Item metadata with the standard ownership keys stamped on top.
    ///
    /// `created_at` is written as unix seconds, matching chunk metadata.
    pub fn result_metadata(&self) -> Metadata {
        let mut meta = self.metadata.clone();
        meta.insert(keys::USER_ID.into(), self.user_id.clone().into());
        meta.insert(keys::APP_ID.into(), self.app_id.clone().into());
        meta.insert(keys::SOURCE_TYPE.into(), self.source_type.clone().into());
        if let Some(link) = &self.link {
            meta.insert(keys::LINK.into(), link.clone().into());
        }
        meta.insert(keys::CREATED_AT.into(), self.created_at.timestamp().into());
        meta
    }

    /// Canonical content-store result for this item.
    pub fn to_result(&self, relevance_score: Option<f64>) -> RetrievalResult {
        RetrievalResult::from_metadata(
            self.id.clone(),
            self.text.clone(),
            relevance_score,
            ResultSource::ContentStore,
            self.result_metadata(),
        )
    }
}

/// Full-text relevance query with owner, source, and time filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentQuery {
    pub query: String,
    pub user_id: String,
    pub app_id: Option<String>,
    pub source_types: Option<Vec<String>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
}

/// Scope of a content deletion: an app, optionally narrowed by source or link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteScope {
    pub app_id: String,
    pub source_type: Option<String>,
    pub link: Option<String>,
}

/// Durable, relational-style content store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or overwrite an item by id.
    async fn upsert_item(&self, item: &ContentItem) -> Result<()>;

    /// Rank items by full-text relevance. Results carry
    /// [`ResultSource::ContentStore`].
    async fn full_text_search(&self, query: &ContentQuery) -> Result<Vec<RetrievalResult>>;

    /// Delete every item in scope, returning the number removed.
    async fn delete_scoped(&self, scope: &DeleteScope) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_query_response_flattens() {
        let resp: QueryResponse = serde_json::from_value(json!({
            "ids": [["a", "b"], ["c"]],
            "documents": [["doc a", null], ["doc c"]],
            "metadatas": [[{ "source_type": "twitter" }, null], [null]],
            "distances": [[0.25, 0.5], [1.5]]
        }))
        .unwrap();

        let results = resp.into_results(ResultSource::Vector);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].content, "doc a");
        assert_eq!(results[0].relevance_score, Some(0.75));
        assert_eq!(results[0].result_type.as_deref(), Some("twitter"));
        assert_eq!(results[1].content, "");
        assert_eq!(results[2].relevance_score, Some(-0.5));
    }

    #[test]
    fn test_flat_get_response_has_no_scores() {
        let resp: GetResponse = serde_json::from_value(json!({
            "ids": ["x", "y"],
            "documents": ["hello", "world"],
            "metadatas": [{ "created_at": 1_700_000_000 }, null]
        }))
        .unwrap();

        let results = resp.into_results(ResultSource::Lexical);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.relevance_score.is_none()));
        assert_eq!(results[0].created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_missing_optional_arrays() {
        let resp: QueryResponse = serde_json::from_value(json!({ "ids": [["only"]] })).unwrap();
        let results = resp.into_results(ResultSource::Vector);
        assert_eq!(results[0].id, "only");
        assert_eq!(results[0].relevance_score, None);
    }
}
