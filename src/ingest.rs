//! Ingestion pipeline.
//!
//! ```text
//! SourceDocument ─▶ stamp metadata ─▶ chunk ─▶ vector gateway (embed + upsert)
//!                                  └──────────▶ content store (whole item)
//! ```
//!
//! Chunk ids are derived from the document id, so re-ingesting a document
//! overwrites its previous chunks in place. If the new version produces
//! fewer chunks, the surplus old chunks remain until the document is
//! deleted by link or source scope.
//!
//! Chunks with nothing to embed (whitespace or control characters only) are
//! skipped. The remaining chunks keep their original index-based ids.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use context_recall_core::chunk::{chunk_document, ChunkOptions};
use context_recall_core::error::{RecallError, Result};
use context_recall_core::models::{keys, Metadata, SourceDocument};
use context_recall_core::sanitize::sanitize_text;
use context_recall_core::store::{ContentItem, ContentStore, DeleteScope};

use crate::vector_store::{VectorDocument, VectorStoreGateway};

/// Outcome of ingesting one document.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunk_ids: Vec<String>,
}

/// Ownership and provenance metadata shared by every chunk of `doc`.
pub fn document_metadata(doc: &SourceDocument) -> Metadata {
    let mut meta = doc.metadata.clone();
    meta.insert(keys::USER_ID.into(), Value::from(doc.user_id.as_str()));
    meta.insert(keys::APP_ID.into(), Value::from(doc.app_id.as_str()));
    meta.insert(keys::SOURCE_TYPE.into(), Value::from(doc.source_type.as_str()));
    if let Some(link) = &doc.link {
        meta.insert(keys::LINK.into(), Value::from(link.as_str()));
    }
    meta.insert(keys::CREATED_AT.into(), Value::from(doc.created_at.timestamp()));
    meta
}

/// Chunk, embed, and store one document.
///
/// # Errors
///
/// [`RecallError::Validation`] for blank text or text with nothing
/// embeddable; embedding and backend errors propagate.
pub async fn ingest_document(
    doc: &SourceDocument,
    chunking: &ChunkOptions,
    vectors: &VectorStoreGateway,
    content: &dyn ContentStore,
) -> Result<IngestReport> {
    if doc.text.trim().is_empty() {
        return Err(RecallError::validation(format!(
            "document {} has empty text",
            doc.id
        )));
    }

    let metadata = document_metadata(doc);
    let chunks: Vec<_> = chunk_document(&doc.id, &doc.text, &metadata, chunking)
        .into_iter()
        .filter(|chunk| sanitize_text(&chunk.text).is_ok())
        .collect();
    if chunks.is_empty() {
        return Err(RecallError::validation(format!(
            "document {} has no embeddable text",
            doc.id
        )));
    }
    let chunk_ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

    let documents = chunks
        .into_iter()
        .map(|chunk| VectorDocument {
            id: chunk.id,
            text: chunk.text,
            metadata: chunk.metadata,
            embedding: chunk.embedding,
        })
        .collect();
    vectors.upsert(documents).await?;

    content
        .upsert_item(&ContentItem {
            id: doc.id.clone(),
            user_id: doc.user_id.clone(),
            app_id: doc.app_id.clone(),
            source_type: doc.source_type.clone(),
            link: doc.link.clone(),
            created_at: doc.created_at,
            text: doc.text.clone(),
            metadata: doc.metadata.clone(),
        })
        .await?;

    tracing::info!(
        document = %doc.id,
        source_type = %doc.source_type,
        chunks = chunk_ids.len(),
        "ingested document"
    );

    Ok(IngestReport {
        document_id: doc.id.clone(),
        chunk_ids,
    })
}

/// Remove everything in `scope` from both stores.
///
/// The vector side is best-effort; content store errors propagate.
/// Returns the number of content items removed.
pub async fn delete_scope(
    scope: &DeleteScope,
    vectors: &VectorStoreGateway,
    content: &Arc<dyn ContentStore>,
) -> Result<u64> {
    match (&scope.source_type, &scope.link) {
        (_, Some(link)) => vectors.delete_by_app_link(&scope.app_id, link).await,
        (Some(source_type), None) => {
            vectors
                .delete_by_app_source(&scope.app_id, source_type)
                .await
        }
        (None, None) => vectors.delete_by_app(&scope.app_id).await,
    }
    content.delete_scoped(scope).await
}
