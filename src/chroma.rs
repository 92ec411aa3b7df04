//! Chroma vector store backend (HTTP, v2 API).
//!
//! Implements the core [`VectorBackend`] / [`VectorCollection`] traits over
//! `reqwest`. Filters are translated from the core [`Filter`] union into
//! Chroma's `where` syntax at this boundary.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | get or create | `POST /api/v2/tenants/{t}/databases/{d}/collections` |
//! | upsert | `POST …/collections/{id}/upsert` |
//! | delete | `POST …/collections/{id}/delete` |
//! | query | `POST …/collections/{id}/query` |
//! | get | `POST …/collections/{id}/get` |
//!
//! Self-hosted servers use the defaults `default_tenant` / `default_database`;
//! hosted deployments set both in `[vector_store]` together with
//! `api_key_env`, whose value is sent as `x-chroma-token`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use context_recall_core::error::{RecallError, Result};
use context_recall_core::filter::Filter;
use context_recall_core::models::Metadata;
use context_recall_core::store::{
    CollectionRecord, DeleteSelector, GetResponse, QueryResponse, VectorBackend, VectorCollection,
};

use crate::config::VectorStoreConfig;

const TOKEN_HEADER: &str = "x-chroma-token";

/// Shared HTTP state for a Chroma server.
#[derive(Clone)]
struct ChromaClient {
    http: reqwest::Client,
    token: Option<String>,
}

impl ChromaClient {
    async fn post<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T> {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.header(TOKEN_HEADER, token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| RecallError::provider(format!("Chroma request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RecallError::provider(format!(
                "Chroma error {}: {}",
                status, body_text
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RecallError::provider(format!("Chroma response decode failed: {}", e)))
    }
}

/// Connection to a Chroma server.
pub struct ChromaBackend {
    client: ChromaClient,
    collections_url: String,
}

impl ChromaBackend {
    /// # Errors
    ///
    /// [`RecallError::Configuration`] when `url` is unset or the variable
    /// named by `api_key_env` is missing.
    pub fn new(config: &VectorStoreConfig, timeout: Duration) -> Result<Self> {
        let base = config
            .url
            .as_deref()
            .ok_or_else(|| RecallError::configuration("vector_store.url is not set"))?
            .trim_end_matches('/');

        let token = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                RecallError::configuration(format!("{} environment variable not set", var))
            })?),
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RecallError::configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client: ChromaClient { http, token },
            collections_url: format!(
                "{}/api/v2/tenants/{}/databases/{}/collections",
                base, config.tenant, config.database
            ),
        })
    }
}

#[derive(Deserialize)]
struct CollectionModel {
    id: String,
    name: String,
}

#[async_trait]
impl VectorBackend for ChromaBackend {
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn VectorCollection>> {
        let body = json!({
            "name": name,
            "get_or_create": true,
            "metadata": { "hnsw:space": "cosine" },
        });
        let model: CollectionModel = self.client.post(&self.collections_url, &body).await?;
        tracing::info!(collection = %model.name, id = %model.id, "opened Chroma collection");

        Ok(Arc::new(ChromaCollection {
            client: self.client.clone(),
            name: model.name,
            url: format!("{}/{}", self.collections_url, model.id),
        }))
    }
}

/// Handle to one Chroma collection.
pub struct ChromaCollection {
    client: ChromaClient,
    name: String,
    url: String,
}

#[async_trait]
impl VectorCollection for ChromaCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[CollectionRecord]) -> Result<()> {
        let body = json!({
            "ids": records.iter().map(|r| &r.id).collect::<Vec<_>>(),
            "embeddings": records.iter().map(|r| &r.embedding).collect::<Vec<_>>(),
            "documents": records.iter().map(|r| &r.document).collect::<Vec<_>>(),
            "metadatas": records.iter().map(|r| scalar_metadata(&r.metadata)).collect::<Vec<_>>(),
        });
        self.client
            .post::<Value>(&format!("{}/upsert", self.url), &body)
            .await?;
        Ok(())
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<()> {
        let body = match selector {
            DeleteSelector::Ids(ids) => json!({ "ids": ids }),
            DeleteSelector::Where(filter) => json!({ "where": to_where(filter) }),
        };
        self.client
            .post::<Value>(&format!("{}/delete", self.url), &body)
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        query_embeddings: &[Vec<f32>],
        filter: Option<&Filter>,
        n_results: usize,
    ) -> Result<QueryResponse> {
        let mut body = json!({
            "query_embeddings": query_embeddings,
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(filter) = filter {
            body["where"] = to_where(filter);
        }
        self.client.post(&format!("{}/query", self.url), &body).await
    }

    async fn get(&self, text: &str, filter: Option<&Filter>, limit: usize) -> Result<GetResponse> {
        let mut body = json!({
            "where_document": { "$contains": text },
            "limit": limit,
            "include": ["documents", "metadatas"],
        });
        if let Some(filter) = filter {
            body["where"] = to_where(filter);
        }
        self.client.post(&format!("{}/get", self.url), &body).await
    }
}

/// Translate a filter expression into Chroma's `where` syntax.
pub fn to_where(filter: &Filter) -> Value {
    match filter {
        Filter::Eq { field, value } => json!({ field: { "$eq": value } }),
        Filter::In { field, values } => json!({ field: { "$in": values } }),
        Filter::Range { field, gte, lte } => {
            let mut clauses = Vec::new();
            if let Some(lo) = gte {
                clauses.push(json!({ field: { "$gte": lo } }));
            }
            if let Some(hi) = lte {
                clauses.push(json!({ field: { "$lte": hi } }));
            }
            combine("$and", clauses)
        }
        Filter::And(clauses) => combine("$and", clauses.iter().map(to_where).collect()),
        Filter::Or(clauses) => combine("$or", clauses.iter().map(to_where).collect()),
    }
}

/// Chroma rejects `$and`/`$or` with fewer than two operands.
fn combine(op: &str, mut clauses: Vec<Value>) -> Value {
    match clauses.len() {
        0 => json!({}),
        1 => clauses.pop().unwrap_or_else(|| json!({})),
        _ => json!({ op: clauses }),
    }
}

/// Chroma metadata values must be scalars: nested values are stored as
/// JSON strings and nulls are dropped.
fn scalar_metadata(metadata: &Metadata) -> Map<String, Value> {
    metadata
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => Some((k.clone(), Value::String(v.to_string()))),
            scalar => Some((k.clone(), scalar.clone())),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_eq_and_in() {
        assert_eq!(
            to_where(&Filter::eq("app_id", "a1")),
            json!({ "app_id": { "$eq": "a1" } })
        );
        assert_eq!(
            to_where(&Filter::any_of("source_type", ["twitter", "notion"])),
            json!({ "source_type": { "$in": ["twitter", "notion"] } })
        );
    }

    #[test]
    fn test_where_range_single_and_double_bound() {
        let one = Filter::range("created_at", Some(10.0), None).unwrap();
        assert_eq!(to_where(&one), json!({ "created_at": { "$gte": 10.0 } }));

        let both = Filter::range("created_at", Some(10.0), Some(20.0)).unwrap();
        assert_eq!(
            to_where(&both),
            json!({ "$and": [
                { "created_at": { "$gte": 10.0 } },
                { "created_at": { "$lte": 20.0 } }
            ] })
        );
    }

    #[test]
    fn test_where_nested_and_or() {
        let f = Filter::And(vec![
            Filter::eq("user_id", "u"),
            Filter::Or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]),
        ]);
        let w = to_where(&f);
        assert_eq!(w["$and"][0], json!({ "user_id": { "$eq": "u" } }));
        assert_eq!(w["$and"][1]["$or"][1], json!({ "b": { "$eq": 2 } }));
    }

    #[test]
    fn test_scalar_metadata() {
        let meta = json!({ "a": 1, "b": null, "c": ["x"], "d": "s" })
            .as_object()
            .cloned()
            .unwrap();
        let out = scalar_metadata(&meta);
        assert!(!out.contains_key("b"));
        assert_eq!(out["c"], json!("[\"x\"]"));
        assert_eq!(out["d"], json!("s"));
    }

    #[test]
    fn test_backend_requires_url() {
        let config = VectorStoreConfig::default();
        assert!(matches!(
            ChromaBackend::new(&config, Duration::from_secs(1)),
            Err(RecallError::Configuration(_))
        ));
    }

    #[test]
    fn test_backend_urls() {
        let config = VectorStoreConfig {
            backend: "chroma".into(),
            url: Some("http://localhost:8000/".into()),
            ..Default::default()
        };
        let backend = ChromaBackend::new(&config, Duration::from_secs(1)).unwrap();
        assert_eq!(
            backend.collections_url,
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections"
        );
    }
}
