//! SQLite-backed durable content store.
//!
//! Whole items live in `content_items`; their text is indexed in the FTS5
//! table `content_fts`. Full-text search ranks with `bm25`, negated so that
//! higher is better, and filters on owner, app, source type, and
//! `created_at` range in the same statement.
//!
//! Query text is reduced to alphanumeric terms, each quoted and joined with
//! `OR`, so user input never reaches the FTS5 query grammar.

use std::path::Path;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use context_recall_core::error::{RecallError, Result};
use context_recall_core::models::{Metadata, RetrievalResult};
use context_recall_core::store::{ContentItem, ContentQuery, ContentStore, DeleteScope};

use crate::{db, migrate};

fn db_err(e: sqlx::Error) -> RecallError {
    RecallError::provider(format!("content store: {}", e))
}

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let pool = db::connect(path).await?;
        migrate::apply_schema(&pool).await?;
        Ok(Self::new(pool))
    }
}

/// Build an FTS5 `MATCH` expression: quoted terms joined with `OR`.
///
/// Returns `None` when the query has no searchable terms.
pub fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn row_to_item(row: &SqliteRow) -> ContentItem {
    let created_at: i64 = row.get("created_at");
    let metadata_json: String = row.get("metadata_json");
    ContentItem {
        id: row.get("id"),
        user_id: row.get("user_id"),
        app_id: row.get("app_id"),
        source_type: row.get("source_type"),
        link: row.get("link"),
        created_at: Utc
            .timestamp_opt(created_at, 0)
            .single()
            .unwrap_or_default(),
        text: row.get("text"),
        metadata: serde_json::from_str::<Metadata>(&metadata_json).unwrap_or_default(),
    }
}

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: &DeleteScope) {
    qb.push("app_id = ").push_bind(scope.app_id.clone());
    if let Some(source_type) = &scope.source_type {
        qb.push(" AND source_type = ").push_bind(source_type.clone());
    }
    if let Some(link) = &scope.link {
        qb.push(" AND link = ").push_bind(link.clone());
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert_item(&self, item: &ContentItem) -> Result<()> {
        let metadata_json = serde_json::to_string(&item.metadata)?;
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO content_items
                (id, user_id, app_id, source_type, link, created_at, text, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                user_id = excluded.user_id,
                app_id = excluded.app_id,
                source_type = excluded.source_type,
                link = excluded.link,
                created_at = excluded.created_at,
                text = excluded.text,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.app_id)
        .bind(&item.source_type)
        .bind(&item.link)
        .bind(item.created_at.timestamp())
        .bind(&item.text)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM content_fts WHERE item_id = ?")
            .bind(&item.id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("INSERT INTO content_fts (item_id, text) VALUES (?, ?)")
            .bind(&item.id)
            .bind(&item.text)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn full_text_search(&self, query: &ContentQuery) -> Result<Vec<RetrievalResult>> {
        let Some(matcher) = fts_query(&query.query) else {
            return Ok(Vec::new());
        };

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"
            SELECT c.id, c.user_id, c.app_id, c.source_type, c.link, c.created_at,
                   c.text, c.metadata_json, bm25(content_fts) AS rank
            FROM content_fts
            JOIN content_items c ON c.id = content_fts.item_id
            WHERE content_fts MATCH "#,
        );
        qb.push_bind(matcher);
        qb.push(" AND c.user_id = ").push_bind(query.user_id.clone());
        if let Some(app_id) = &query.app_id {
            qb.push(" AND c.app_id = ").push_bind(app_id.clone());
        }
        if let Some(sources) = query.source_types.as_ref().filter(|s| !s.is_empty()) {
            qb.push(" AND c.source_type IN (");
            let mut separated = qb.separated(", ");
            for source in sources {
                separated.push_bind(source.clone());
            }
            separated.push_unseparated(")");
        }
        if let Some(start) = query.start {
            qb.push(" AND c.created_at >= ").push_bind(start.timestamp());
        }
        if let Some(end) = query.end {
            qb.push(" AND c.created_at <= ").push_bind(end.timestamp());
        }
        qb.push(" ORDER BY rank LIMIT ").push_bind(query.limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_err)?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                row_to_item(row).to_result(Some(-rank))
            })
            .collect())
    }

    async fn delete_scoped(&self, scope: &DeleteScope) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let mut fts: QueryBuilder<Sqlite> = QueryBuilder::new(
            "DELETE FROM content_fts WHERE item_id IN (SELECT id FROM content_items WHERE ",
        );
        push_scope(&mut fts, scope);
        fts.push(")");
        fts.build().execute(&mut *tx).await.map_err(db_err)?;

        let mut items: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM content_items WHERE ");
        push_scope(&mut items, scope);
        let removed = items
            .build()
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();

        tx.commit().await.map_err(db_err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use context_recall_core::models::ResultSource;
    use serde_json::json;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SqliteContentStore) {
        let dir = TempDir::new().unwrap();
        let store = SqliteContentStore::open(&dir.path().join("content.sqlite"))
            .await
            .unwrap();
        (dir, store)
    }

    fn item(id: &str, text: &str, source_type: &str, age_days: i64) -> ContentItem {
        let mut metadata = Metadata::new();
        metadata.insert("title".into(), json!(format!("item {}", id)));
        ContentItem {
            id: id.into(),
            user_id: "u1".into(),
            app_id: "app".into(),
            source_type: source_type.into(),
            link: Some(format!("https://example.com/{}", id)),
            created_at: Utc::now() - Duration::days(age_days),
            text: text.into(),
            metadata,
        }
    }

    #[test]
    fn test_fts_query_quotes_terms() {
        assert_eq!(
            fts_query("Rust: async-await?").as_deref(),
            Some("\"rust\" OR \"async\" OR \"await\"")
        );
        assert_eq!(fts_query("  ?! "), None);
    }

    #[tokio::test]
    async fn test_search_ranks_and_maps_fields() {
        let (_dir, store) = store().await;
        store
            .upsert_item(&item("a", "rust rust rust ownership", "twitter", 1))
            .await
            .unwrap();
        store
            .upsert_item(&item(
                "b",
                "a note that mentions rust once among many other words",
                "notion",
                2,
            ))
            .await
            .unwrap();
        store
            .upsert_item(&item("c", "gardening", "notion", 2))
            .await
            .unwrap();

        let results = store
            .full_text_search(&ContentQuery {
                query: "rust".into(),
                user_id: "u1".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].rank_score() >= results[1].rank_score());
        assert_eq!(results[0].source, ResultSource::ContentStore);
        assert_eq!(results[0].result_type.as_deref(), Some("twitter"));
        assert_eq!(results[0].metadata["title"], "item a");
        assert!(results[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_filters_owner_source_and_window() {
        let (_dir, store) = store().await;
        store.upsert_item(&item("old", "weekly report", "notion", 40)).await.unwrap();
        store.upsert_item(&item("new", "weekly report", "notion", 1)).await.unwrap();
        store.upsert_item(&item("tw", "weekly report", "twitter", 1)).await.unwrap();
        let mut other = item("other", "weekly report", "notion", 1);
        other.user_id = "u2".into();
        store.upsert_item(&other).await.unwrap();

        let results = store
            .full_text_search(&ContentQuery {
                query: "report".into(),
                user_id: "u1".into(),
                app_id: Some("app".into()),
                source_types: Some(vec!["notion".into()]),
                start: Some(Utc::now() - Duration::days(7)),
                end: Some(Utc::now()),
                limit: 10,
            })
            .await
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_index_entry() {
        let (_dir, store) = store().await;
        store.upsert_item(&item("a", "first draft", "notion", 1)).await.unwrap();
        store.upsert_item(&item("a", "final version", "notion", 1)).await.unwrap();

        let q = |text: &str| ContentQuery {
            query: text.into(),
            user_id: "u1".into(),
            limit: 10,
            ..Default::default()
        };
        assert!(store.full_text_search(&q("draft")).await.unwrap().is_empty());
        assert_eq!(store.full_text_search(&q("final")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_scoped() {
        let (_dir, store) = store().await;
        store.upsert_item(&item("a", "shared words", "twitter", 1)).await.unwrap();
        store.upsert_item(&item("b", "shared words", "notion", 1)).await.unwrap();

        let removed = store
            .delete_scoped(&DeleteScope {
                app_id: "app".into(),
                source_type: Some("twitter".into()),
                link: None,
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let results = store
            .full_text_search(&ContentQuery {
                query: "shared".into(),
                user_id: "u1".into(),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");
    }
}
