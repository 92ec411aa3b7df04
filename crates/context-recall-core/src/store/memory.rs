//! In-memory backends for testing and local experiments.
//!
//! Uses `Vec` and `HashMap` behind `std::sync` locks for thread safety.
//! Nearest-neighbor search is brute-force cosine over every stored
//! vector, reported as cosine distance (`1 - similarity`) the way a
//! cosine-space collection would. Full-text search scores an item by the
//! fraction of query terms it contains.
//!
//! Every backend counts its calls and can be told to fail, so tests can
//! assert that a code path made zero backend calls or degraded cleanly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RecallError, Result};
use crate::filter::Filter;
use crate::models::RetrievalResult;

use super::{
    CollectionRecord, ContentItem, ContentQuery, ContentStore, DeleteScope, DeleteSelector,
    GetResponse, QueryResponse, VectorBackend, VectorCollection,
};

fn poisoned(what: &str) -> RecallError {
    RecallError::provider(format!("in-memory {} lock poisoned", what))
}

/// In-memory vector collection.
pub struct InMemoryCollection {
    name: String,
    records: RwLock<Vec<CollectionRecord>>,
    upsert_batches: Mutex<Vec<usize>>,
    query_calls: AtomicUsize,
    get_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    /// Upsert calls at or beyond this index fail.
    fail_upserts_from: AtomicUsize,
    fail_queries: AtomicBool,
    fail_gets: AtomicBool,
    fail_deletes: AtomicBool,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: RwLock::new(Vec::new()),
            upsert_batches: Mutex::new(Vec::new()),
            query_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fail_upserts_from: AtomicUsize::new(usize::MAX),
            fail_queries: AtomicBool::new(false),
            fail_gets: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Let the first `n` upsert calls succeed and fail every later one.
    pub fn fail_upserts_after(&self, n: usize) {
        self.fail_upserts_from.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Record count currently stored.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored record by id.
    pub fn record(&self, id: &str) -> Option<CollectionRecord> {
        self.records
            .read()
            .ok()
            .and_then(|r| r.iter().find(|rec| rec.id == id).cloned())
    }

    /// Size of every upsert call received, in call order (including failed ones).
    pub fn upsert_batches(&self) -> Vec<usize> {
        self.upsert_batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, records: &[CollectionRecord]) -> Result<()> {
        let call_index = {
            let mut batches = self.upsert_batches.lock().map_err(|_| poisoned("batch log"))?;
            batches.push(records.len());
            batches.len() - 1
        };
        if call_index >= self.fail_upserts_from.load(Ordering::SeqCst) {
            return Err(RecallError::provider(format!(
                "collection '{}' rejected upsert #{}",
                self.name,
                call_index + 1
            )));
        }

        let mut stored = self.records.write().map_err(|_| poisoned("records"))?;
        let expected_dims = stored.first().map(|r| r.embedding.len());
        for record in records {
            if let Some(dims) = expected_dims {
                if record.embedding.len() != dims {
                    return Err(RecallError::DimensionMismatch {
                        left: dims,
                        right: record.embedding.len(),
                    });
                }
            }
        }
        for record in records {
            match stored.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => stored.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RecallError::provider("delete unavailable"));
        }
        let mut stored = self.records.write().map_err(|_| poisoned("records"))?;
        match selector {
            DeleteSelector::Ids(ids) => stored.retain(|r| !ids.contains(&r.id)),
            DeleteSelector::Where(filter) => stored.retain(|r| !filter.matches(&r.metadata)),
        }
        Ok(())
    }

    async fn query(
        &self,
        query_embeddings: &[Vec<f32>],
        filter: Option<&Filter>,
        n_results: usize,
    ) -> Result<QueryResponse> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(RecallError::provider("query unavailable"));
        }
        let stored = self.records.read().map_err(|_| poisoned("records"))?;

        let mut response = QueryResponse {
            ids: Vec::new(),
            documents: Some(Vec::new()),
            metadatas: Some(Vec::new()),
            distances: Some(Vec::new()),
        };

        for query in query_embeddings {
            let mut scored: Vec<(f32, &CollectionRecord)> = Vec::new();
            for record in stored.iter() {
                if filter.is_some_and(|f| !f.matches(&record.metadata)) {
                    continue;
                }
                let distance = 1.0 - cosine_similarity(query, &record.embedding)?;
                scored.push((distance, record));
            }
            scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(n_results);

            response.ids.push(scored.iter().map(|(_, r)| r.id.clone()).collect());
            if let Some(docs) = response.documents.as_mut() {
                docs.push(scored.iter().map(|(_, r)| Some(r.document.clone())).collect());
            }
            if let Some(metas) = response.metadatas.as_mut() {
                metas.push(scored.iter().map(|(_, r)| Some(r.metadata.clone())).collect());
            }
            if let Some(dists) = response.distances.as_mut() {
                dists.push(scored.iter().map(|(d, _)| Some(*d)).collect());
            }
        }

        Ok(response)
    }

    async fn get(&self, text: &str, filter: Option<&Filter>, limit: usize) -> Result<GetResponse> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(RecallError::provider("get unavailable"));
        }
        let stored = self.records.read().map_err(|_| poisoned("records"))?;

        let hits: Vec<&CollectionRecord> = stored
            .iter()
            .filter(|r| r.document.contains(text))
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .take(limit)
            .collect();

        Ok(GetResponse {
            ids: hits.iter().map(|r| r.id.clone()).collect(),
            documents: Some(hits.iter().map(|r| Some(r.document.clone())).collect()),
            metadatas: Some(hits.iter().map(|r| Some(r.metadata.clone())).collect()),
        })
    }
}

/// In-memory vector backend handing out [`InMemoryCollection`]s by name.
pub struct InMemoryBackend {
    collections: Mutex<HashMap<String, Arc<InMemoryCollection>>>,
    init_calls: AtomicUsize,
    pending_init_failures: AtomicUsize,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            init_calls: AtomicUsize::new(0),
            pending_init_failures: AtomicUsize::new(0),
        }
    }

    /// Pre-register a collection so a test can configure it before use.
    pub fn with_collection(self, collection: Arc<InMemoryCollection>) -> Self {
        if let Ok(mut map) = self.collections.lock() {
            map.insert(collection.name().to_string(), collection);
        }
        self
    }

    /// Fail the next `n` calls to [`VectorBackend::get_or_create_collection`].
    pub fn fail_next_inits(&self, n: usize) {
        self.pending_init_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `get_or_create_collection` calls received.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn collection(&self, name: &str) -> Option<Arc<InMemoryCollection>> {
        self.collections.lock().ok()?.get(name).cloned()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn get_or_create_collection(&self, name: &str) -> Result<Arc<dyn VectorCollection>> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .pending_init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RecallError::provider("vector backend unreachable"));
        }

        let mut map = self.collections.lock().map_err(|_| poisoned("collections"))?;
        let collection = map
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryCollection::new(name)))
            .clone();
        Ok(collection)
    }
}

/// In-memory durable content store.
pub struct InMemoryContentStore {
    items: RwLock<Vec<ContentItem>>,
    search_calls: AtomicUsize,
    fail_searches: AtomicBool,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            search_calls: AtomicUsize::new(0),
            fail_searches: AtomicBool::new(false),
        }
    }

    pub fn set_fail_searches(&self, fail: bool) {
        self.fail_searches.store(fail, Ordering::SeqCst);
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn admits(query: &ContentQuery, item: &ContentItem) -> bool {
    item.user_id == query.user_id
        && query.app_id.as_ref().map_or(true, |a| *a == item.app_id)
        && query
            .source_types
            .as_ref()
            .map_or(true, |s| s.contains(&item.source_type))
        && query.start.map_or(true, |s| item.created_at >= s)
        && query.end.map_or(true, |e| item.created_at <= e)
}

fn in_scope(scope: &DeleteScope, item: &ContentItem) -> bool {
    item.app_id == scope.app_id
        && scope
            .source_type
            .as_ref()
            .map_or(true, |s| *s == item.source_type)
        && scope
            .link
            .as_ref()
            .map_or(true, |l| item.link.as_ref() == Some(l))
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upsert_item(&self, item: &ContentItem) -> Result<()> {
        let mut items = self.items.write().map_err(|_| poisoned("items"))?;
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => items.push(item.clone()),
        }
        Ok(())
    }

    async fn full_text_search(&self, query: &ContentQuery) -> Result<Vec<RetrievalResult>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_searches.load(Ordering::SeqCst) {
            return Err(RecallError::provider("content store unavailable"));
        }

        let terms: Vec<String> = query
            .query
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|t| !t.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.items.read().map_err(|_| poisoned("items"))?;
        let mut scored: Vec<(f64, &ContentItem)> = items
            .iter()
            .filter(|item| admits(query, item))
            .filter_map(|item| {
                let text = item.text.to_lowercase();
                let matched = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (matched > 0).then(|| (matched as f64 / terms.len() as f64, item))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(query.limit);

        Ok(scored
            .into_iter()
            .map(|(score, item)| item.to_result(Some(score)))
            .collect())
    }

    async fn delete_scoped(&self, scope: &DeleteScope) -> Result<u64> {
        let mut items = self.items.write().map_err(|_| poisoned("items"))?;
        let before = items.len();
        items.retain(|item| !in_scope(scope, item));
        Ok((before - items.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, ResultSource};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn record(id: &str, doc: &str, embedding: Vec<f32>, app: &str) -> CollectionRecord {
        let mut metadata = Metadata::new();
        metadata.insert("app_id".into(), json!(app));
        CollectionRecord {
            id: id.into(),
            document: doc.into(),
            metadata,
            embedding,
        }
    }

    fn item(id: &str, text: &str, source_type: &str, age_days: i64) -> ContentItem {
        ContentItem {
            id: id.into(),
            user_id: "u1".into(),
            app_id: "app".into(),
            source_type: source_type.into(),
            link: Some(format!("https://example.com/{}", id)),
            created_at: Utc::now() - Duration::days(age_days),
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let c = InMemoryCollection::new("c");
        let batch = vec![record("a", "first", vec![1.0, 0.0], "x")];
        c.upsert(&batch).await.unwrap();
        c.upsert(&batch).await.unwrap();
        assert_eq!(c.len(), 1);

        c.upsert(&[record("a", "second", vec![0.0, 1.0], "x")])
            .await
            .unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c.record("a").unwrap().document, "second");
        assert_eq!(c.upsert_batches(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_and_filters() {
        let c = InMemoryCollection::new("c");
        c.upsert(&[
            record("near", "near", vec![1.0, 0.1], "x"),
            record("far", "far", vec![0.0, 1.0], "x"),
            record("other", "other", vec![1.0, 0.0], "y"),
        ])
        .await
        .unwrap();

        let filter = Filter::eq("app_id", "x");
        let resp = c.query(&[vec![1.0, 0.0]], Some(&filter), 10).await.unwrap();
        assert_eq!(resp.ids, vec![vec!["near".to_string(), "far".to_string()]]);

        let results = resp.into_results(ResultSource::Vector);
        assert!(results[0].relevance_score.unwrap() > results[1].relevance_score.unwrap());
        assert_eq!(c.query_calls(), 1);
    }

    #[tokio::test]
    async fn test_get_is_substring_match() {
        let c = InMemoryCollection::new("c");
        c.upsert(&[
            record("a", "learning Rust today", vec![1.0], "x"),
            record("b", "python notes", vec![1.0], "x"),
        ])
        .await
        .unwrap();
        let resp = c.get("Rust", None, 10).await.unwrap();
        assert_eq!(resp.ids, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_by_filter() {
        let c = InMemoryCollection::new("c");
        c.upsert(&[
            record("a", "a", vec![1.0], "x"),
            record("b", "b", vec![1.0], "y"),
        ])
        .await
        .unwrap();
        c.delete(&DeleteSelector::Where(Filter::eq("app_id", "x")))
            .await
            .unwrap();
        assert!(c.record("a").is_none());
        assert!(c.record("b").is_some());
    }

    #[tokio::test]
    async fn test_upsert_failure_injection() {
        let c = InMemoryCollection::new("c");
        c.fail_upserts_after(1);
        assert!(c.upsert(&[record("a", "a", vec![1.0], "x")]).await.is_ok());
        assert!(c.upsert(&[record("b", "b", vec![1.0], "x")]).await.is_err());
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_init_failures_then_recovers() {
        let backend = InMemoryBackend::new();
        backend.fail_next_inits(1);
        assert!(backend.get_or_create_collection("c").await.is_err());
        let c = backend.get_or_create_collection("c").await.unwrap();
        assert_eq!(c.name(), "c");
        assert_eq!(backend.init_calls(), 2);
        assert!(backend.collection("c").is_some());
    }

    #[tokio::test]
    async fn test_content_search_ranks_and_filters() {
        let store = InMemoryContentStore::new();
        store
            .upsert_item(&item("a", "rust async runtime", "twitter", 1))
            .await
            .unwrap();
        store
            .upsert_item(&item("b", "rust only", "twitter", 2))
            .await
            .unwrap();
        store
            .upsert_item(&item("c", "rust async", "notion", 3))
            .await
            .unwrap();

        let query = ContentQuery {
            query: "rust async".into(),
            user_id: "u1".into(),
            source_types: Some(vec!["twitter".into()]),
            limit: 10,
            ..Default::default()
        };
        let results = store.full_text_search(&query).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(results[0].source, ResultSource::ContentStore);
        assert_eq!(results[0].result_type.as_deref(), Some("twitter"));
        assert!(results[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_content_search_time_window() {
        let store = InMemoryContentStore::new();
        store
            .upsert_item(&item("old", "weekly report", "notion", 40))
            .await
            .unwrap();
        store
            .upsert_item(&item("new", "weekly report", "notion", 1))
            .await
            .unwrap();
        let query = ContentQuery {
            query: "report".into(),
            user_id: "u1".into(),
            start: Some(Utc::now() - Duration::days(7)),
            limit: 10,
            ..Default::default()
        };
        let results = store.full_text_search(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "new");
    }

    #[tokio::test]
    async fn test_content_delete_scoped() {
        let store = InMemoryContentStore::new();
        store.upsert_item(&item("a", "x", "twitter", 1)).await.unwrap();
        store.upsert_item(&item("b", "x", "notion", 1)).await.unwrap();
        let removed = store
            .delete_scoped(&DeleteScope {
                app_id: "app".into(),
                source_type: Some("twitter".into()),
                link: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 1);
    }
}
