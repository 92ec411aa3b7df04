//! Vector store gateway.
//!
//! The only component that holds the live collection handle. It embeds
//! missing vectors on upsert, splits writes into sequential sub-batches
//! under the store's quota, and normalizes query responses into
//! [`RetrievalResult`]s.
//!
//! # Collection handle
//!
//! The handle is opened on first use through a [`OnceCell`] and reused for
//! the life of the gateway. Concurrent first callers await the same
//! in-flight open. A failed open leaves the cell empty, so the next call
//! tries again; the failure itself is returned to the caller that hit it.
//!
//! # Failure policy
//!
//! | Operation | On backend error |
//! |-----------|------------------|
//! | upsert | propagate; sub-batches already written stay written |
//! | delete | log and swallow |
//! | query | log and return an empty list |

use std::sync::Arc;

use tokio::sync::OnceCell;

use context_recall_core::error::{RecallError, Result};
use context_recall_core::filter::Filter;
use context_recall_core::models::{keys, Metadata, ResultSource, RetrievalResult};
use context_recall_core::store::{CollectionRecord, DeleteSelector, VectorBackend, VectorCollection};

use crate::embedder::Embedder;

/// A document handed to [`VectorStoreGateway::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Computed during upsert when absent.
    pub embedding: Option<Vec<f32>>,
}

pub struct VectorStoreGateway {
    backend: Arc<dyn VectorBackend>,
    collection_name: String,
    collection: OnceCell<Arc<dyn VectorCollection>>,
    embedder: Arc<Embedder>,
    upsert_batch_size: usize,
}

impl VectorStoreGateway {
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        collection_name: impl Into<String>,
        embedder: Arc<Embedder>,
        upsert_batch_size: usize,
    ) -> Self {
        Self {
            backend,
            collection_name: collection_name.into(),
            collection: OnceCell::new(),
            embedder,
            upsert_batch_size: upsert_batch_size.max(1),
        }
    }

    /// The shared collection handle, opening it on first use.
    pub async fn collection(&self) -> Result<Arc<dyn VectorCollection>> {
        let handle = self
            .collection
            .get_or_try_init(|| async {
                tracing::debug!(collection = %self.collection_name, "opening vector collection");
                self.backend
                    .get_or_create_collection(&self.collection_name)
                    .await
            })
            .await?;
        Ok(handle.clone())
    }

    /// Write documents, embedding any without a precomputed vector.
    ///
    /// Writes go out in sequential sub-batches of at most
    /// `upsert_batch_size` records. When a sub-batch fails, earlier
    /// sub-batches remain committed; re-upserting the same ids is safe.
    pub async fn upsert(&self, documents: Vec<VectorDocument>) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        let records = self.embed_missing(documents).await?;
        let collection = self.collection().await?;

        let total = records.len();
        let mut written = 0;
        for batch in records.chunks(self.upsert_batch_size) {
            collection.upsert(batch).await.map_err(|e| {
                tracing::warn!(written, total, error = %e, "vector upsert sub-batch failed");
                e
            })?;
            written += batch.len();
            tracing::debug!(written, total, "vector upsert sub-batch committed");
        }
        Ok(written)
    }

    async fn embed_missing(&self, documents: Vec<VectorDocument>) -> Result<Vec<CollectionRecord>> {
        let budget = self.embedder.char_budget();
        let mut short = Vec::new();
        for (i, doc) in documents.iter().enumerate() {
            if doc.embedding.is_none() && doc.text.chars().count() <= budget {
                short.push(i);
            }
        }

        let texts: Vec<String> = short.iter().map(|&i| documents[i].text.clone()).collect();
        let batch_vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed_batch(&texts).await?.embeddings
        };
        let mut batch_vectors = batch_vectors.into_iter();

        let mut records = Vec::with_capacity(documents.len());
        let mut next_short = short.into_iter().peekable();
        for (i, doc) in documents.into_iter().enumerate() {
            let embedding = match doc.embedding {
                Some(e) => e,
                None if next_short.peek() == Some(&i) => {
                    next_short.next();
                    batch_vectors
                        .next()
                        .ok_or_else(|| RecallError::provider("missing batch embedding"))?
                }
                None => self.embedder.embed_long_text(&doc.text).await?.embedding,
            };
            records.push(CollectionRecord {
                id: doc.id,
                document: doc.text,
                metadata: doc.metadata,
                embedding,
            });
        }
        Ok(records)
    }

    /// Best-effort delete by explicit ids.
    pub async fn delete_by_ids(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        self.delete_best_effort(DeleteSelector::Ids(ids.to_vec()), "ids")
            .await
    }

    /// Best-effort delete of everything owned by `app_id`.
    pub async fn delete_by_app(&self, app_id: &str) {
        self.delete_best_effort(
            DeleteSelector::Where(Filter::eq(keys::APP_ID, app_id)),
            "app",
        )
        .await
    }

    /// Best-effort delete of one source type within an app.
    pub async fn delete_by_app_source(&self, app_id: &str, source_type: &str) {
        let filter = Filter::And(vec![
            Filter::eq(keys::APP_ID, app_id),
            Filter::eq(keys::SOURCE_TYPE, source_type),
        ]);
        self.delete_best_effort(DeleteSelector::Where(filter), "app+source")
            .await
    }

    /// Best-effort delete of every chunk of one linked item within an app.
    pub async fn delete_by_app_link(&self, app_id: &str, link: &str) {
        let filter = Filter::And(vec![
            Filter::eq(keys::APP_ID, app_id),
            Filter::eq(keys::LINK, link),
        ]);
        self.delete_best_effort(DeleteSelector::Where(filter), "app+link")
            .await
    }

    async fn delete_best_effort(&self, selector: DeleteSelector, scope: &str) {
        let outcome = match self.collection().await {
            Ok(collection) => collection.delete(&selector).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            tracing::warn!(scope, error = %e, "vector delete failed; ignoring");
        }
    }

    /// Nearest-neighbor search for `query`.
    ///
    /// Returns an empty list on any embedding or backend failure.
    pub async fn query(
        &self,
        query: &str,
        filter: Option<&Filter>,
        top_k: usize,
    ) -> Vec<RetrievalResult> {
        match self.try_query(query, filter, top_k).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "vector search failed; returning no results");
                Vec::new()
            }
        }
    }

    async fn try_query(
        &self,
        query: &str,
        filter: Option<&Filter>,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let embedded = self.embedder.embed_one(query).await?;
        let collection = self.collection().await?;
        let response = collection
            .query(&[embedded.embedding], filter, top_k)
            .await?;
        Ok(response.into_results(ResultSource::Vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_recall_core::embedding::HashEmbeddingProvider;
    use context_recall_core::store::memory::{InMemoryBackend, InMemoryCollection};
    use serde_json::json;
    use std::time::Duration;

    fn doc(id: &str, text: &str, app: &str) -> VectorDocument {
        let mut metadata = Metadata::new();
        metadata.insert(keys::APP_ID.into(), json!(app));
        metadata.insert(keys::SOURCE_TYPE.into(), json!("notion"));
        VectorDocument {
            id: id.into(),
            text: text.into(),
            metadata,
            embedding: None,
        }
    }

    fn gateway(
        backend: Arc<InMemoryBackend>,
        provider: Arc<HashEmbeddingProvider>,
        batch: usize,
    ) -> VectorStoreGateway {
        let embedder = Arc::new(Embedder::with_limits(provider, 500, 100, Duration::ZERO));
        VectorStoreGateway::new(backend, "c", embedder, batch)
    }

    #[tokio::test]
    async fn test_mixed_precomputed_and_lazy_embeddings() {
        let backend = Arc::new(InMemoryBackend::new());
        let provider = Arc::new(HashEmbeddingProvider::new(8));
        let gw = gateway(backend.clone(), provider.clone(), 300);

        let mut pre = doc("pre", "already embedded", "a");
        pre.embedding = Some(vec![1.0; 8]);
        gw.upsert(vec![pre, doc("lazy", "needs a vector", "a")])
            .await
            .unwrap();

        assert_eq!(provider.calls(), vec![vec!["needs a vector".to_string()]]);
        let c = backend.collection("c").unwrap();
        assert_eq!(c.record("pre").unwrap().embedding, vec![1.0; 8]);
        assert_eq!(
            c.record("lazy").unwrap().embedding,
            provider.vector_for("needs a vector")
        );
    }

    #[tokio::test]
    async fn test_upsert_splits_into_sub_batches() {
        let backend = Arc::new(InMemoryBackend::new());
        let gw = gateway(backend.clone(), Arc::new(HashEmbeddingProvider::new(4)), 300);
        let docs: Vec<_> = (0..650).map(|i| doc(&format!("d{}", i), "text", "a")).collect();

        assert_eq!(gw.upsert(docs).await.unwrap(), 650);
        let c = backend.collection("c").unwrap();
        assert_eq!(c.upsert_batches(), vec![300, 300, 50]);
        assert_eq!(c.len(), 650);
    }

    #[tokio::test]
    async fn test_partial_upsert_keeps_committed_batches() {
        let collection = Arc::new(InMemoryCollection::new("c"));
        collection.fail_upserts_after(1);
        let backend = Arc::new(InMemoryBackend::new().with_collection(collection.clone()));
        let gw = gateway(backend, Arc::new(HashEmbeddingProvider::new(4)), 2);
        let docs: Vec<_> = (0..5).map(|i| doc(&format!("d{}", i), "text", "a")).collect();

        assert!(gw.upsert(docs).await.is_err());
        assert_eq!(collection.len(), 2);
        assert!(collection.record("d0").is_some());
        assert!(collection.record("d2").is_none());
    }

    #[tokio::test]
    async fn test_collection_opened_once() {
        let backend = Arc::new(InMemoryBackend::new());
        let gw = gateway(backend.clone(), Arc::new(HashEmbeddingProvider::new(4)), 300);
        gw.upsert(vec![doc("a", "one", "x")]).await.unwrap();
        gw.query("one", None, 5).await;
        gw.delete_by_app("x").await;
        assert_eq!(backend.init_calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_open_is_retried_on_next_call() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.fail_next_inits(1);
        let gw = gateway(backend.clone(), Arc::new(HashEmbeddingProvider::new(4)), 300);

        assert!(gw.collection().await.is_err());
        assert!(gw.collection().await.is_ok());
        assert!(gw.collection().await.is_ok());
        assert_eq!(backend.init_calls(), 2);
    }

    #[tokio::test]
    async fn test_query_scores_and_fail_open() {
        let collection = Arc::new(InMemoryCollection::new("c"));
        let backend = Arc::new(InMemoryBackend::new().with_collection(collection.clone()));
        let gw = gateway(backend, Arc::new(HashEmbeddingProvider::new(16)), 300);
        gw.upsert(vec![
            doc("match", "rust ownership rules", "a"),
            doc("other", "gardening tips", "a"),
        ])
        .await
        .unwrap();

        let results = gw.query("rust ownership rules", None, 10).await;
        assert_eq!(results[0].id, "match");
        assert!((results[0].relevance_score.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(results[0].source, ResultSource::Vector);

        collection.set_fail_queries(true);
        assert!(gw.query("rust", None, 10).await.is_empty());
        // empty query text fails validation and degrades the same way
        collection.set_fail_queries(false);
        assert!(gw.query("   ", None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_deletes_are_best_effort() {
        let collection = Arc::new(InMemoryCollection::new("c"));
        let backend = Arc::new(InMemoryBackend::new().with_collection(collection.clone()));
        let gw = gateway(backend, Arc::new(HashEmbeddingProvider::new(4)), 300);

        let mut linked = doc("l", "linked", "a");
        linked
            .metadata
            .insert(keys::LINK.into(), json!("https://x.test/1"));
        gw.upsert(vec![linked, doc("n", "notion page", "a"), doc("b", "other app", "b")])
            .await
            .unwrap();

        gw.delete_by_app_link("a", "https://x.test/1").await;
        assert!(collection.record("l").is_none());
        gw.delete_by_app_source("a", "notion").await;
        assert!(collection.record("n").is_none());
        assert!(collection.record("b").is_some());

        collection.set_fail_deletes(true);
        gw.delete_by_ids(&["b".to_string()]).await;
        assert!(collection.record("b").is_some());
    }
}
