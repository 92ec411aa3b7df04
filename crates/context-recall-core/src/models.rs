//! Core data models used throughout Context Recall.
//!
//! These types represent the chunks written at ingestion time and the
//! requests, analyses, and results that flow through a single retrieval.
//! Nothing about a query is persisted; requests and results are created
//! and dropped per call.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arbitrary key-value metadata attached to chunks and results.
pub type Metadata = serde_json::Map<String, Value>;

/// Standard metadata keys stamped on every ingested chunk.
pub mod keys {
    pub const USER_ID: &str = "user_id";
    pub const APP_ID: &str = "app_id";
    pub const SOURCE_TYPE: &str = "source_type";
    pub const LINK: &str = "link";
    pub const CREATED_AT: &str = "created_at";
    pub const PARENT_ID: &str = "parent_id";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const TOTAL_CHUNKS: &str = "total_chunks";
    pub const CONTENT_HASH: &str = "content_hash";
    pub const RECENCY_MULTIPLIER: &str = "recency_multiplier";
}

/// Source type used for durable long-term memories.
pub const MEMORY_SOURCE_TYPE: &str = "memory";

/// Raw document handed to the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub user_id: String,
    pub app_id: String,
    /// e.g. `"twitter"`, `"notion"`, `"memory"`.
    pub source_type: String,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A bounded slice of a document, ready to embed and store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Parent id for single-chunk documents, `{parent}_chunk_{index}` otherwise.
    pub id: String,
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub metadata: Metadata,
    /// Precomputed embedding; computed lazily on upsert when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Resolved time window for a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalConstraint {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    /// The query asks for recent content ("what did I post lately").
    #[serde(default)]
    pub recency: bool,
}

/// Structured interpretation of a query, produced upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub temporal_constraint: Option<TemporalConstraint>,
    pub source_filter: Option<Vec<String>>,
}

/// A single "search the user's content" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub user_id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub temporal_constraint: Option<TemporalConstraint>,
    #[serde(default)]
    pub source_types: Option<Vec<String>>,
}

fn default_max_results() -> usize {
    20
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            app_id: None,
            max_results: default_max_results(),
            temporal_constraint: None,
            source_types: None,
        }
    }

    pub fn with_app(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }
}

/// Which subsystem produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Nearest-neighbor search over the vector store.
    Vector,
    /// "Document contains" search over the vector store.
    Lexical,
    /// Full-text relevance search over the durable content store.
    ContentStore,
    /// Durable long-term memory.
    Memory,
}

/// Canonical result shape shared by every gateway and retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub content: String,
    /// Higher is better. Not comparable across sources; `None` for
    /// presence-only lexical matches.
    pub relevance_score: Option<f64>,
    pub source: ResultSource,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RetrievalResult {
    /// Build a result, deriving `type` and `created_at` from metadata.
    pub fn from_metadata(
        id: impl Into<String>,
        content: impl Into<String>,
        relevance_score: Option<f64>,
        source: ResultSource,
        metadata: Metadata,
    ) -> Self {
        let result_type = metadata
            .get(keys::SOURCE_TYPE)
            .and_then(Value::as_str)
            .map(str::to_string);
        let created_at = metadata.get(keys::CREATED_AT).and_then(parse_timestamp);
        Self {
            id: id.into(),
            content: content.into(),
            relevance_score,
            source,
            result_type,
            created_at,
            metadata,
        }
    }

    /// Score used for ranking; unscored results rank as zero.
    pub fn rank_score(&self) -> f64 {
        self.relevance_score.unwrap_or(0.0)
    }
}

/// Merged output of a retrieval.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalResponse {
    /// Deduplicated, score-sorted, capped results from every retriever.
    pub results: Vec<RetrievalResult>,
    /// Subset of `results` that came from durable memory.
    pub memories: Vec<RetrievalResult>,
    /// Subset of `results` that came from raw ingested content.
    pub content: Vec<RetrievalResult>,
    pub total_results: usize,
    pub processing_time_ms: u64,
}

/// Parse a metadata timestamp: unix seconds (int or float) or RFC 3339.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_metadata_derives_type_and_time() {
        let mut meta = Metadata::new();
        meta.insert(keys::SOURCE_TYPE.into(), json!("twitter"));
        meta.insert(keys::CREATED_AT.into(), json!(1_700_000_000));
        let r = RetrievalResult::from_metadata("a", "hello", Some(0.5), ResultSource::Vector, meta);
        assert_eq!(r.result_type.as_deref(), Some("twitter"));
        assert_eq!(r.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn test_parse_timestamp_rfc3339() {
        let ts = parse_timestamp(&json!("2024-03-01T12:00:00Z")).unwrap();
        assert_eq!(ts.timestamp(), 1_709_294_400);
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: RetrievalRequest =
            serde_json::from_value(json!({ "query": "rust", "user_id": "u1" })).unwrap();
        assert_eq!(req.max_results, 20);
        assert!(req.app_id.is_none());
    }

    #[test]
    fn test_result_type_serializes_as_type() {
        let r = RetrievalResult::from_metadata(
            "a",
            "x",
            None,
            ResultSource::Lexical,
            json!({ "source_type": "notion" }).as_object().unwrap().clone(),
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "notion");
        assert_eq!(v["source"], "lexical");
        assert!(v["relevance_score"].is_null());
    }
}
