//! Wiring: build every long-lived component from a [`Config`].
//!
//! One [`Services`] value is created per process and shared by the CLI
//! and the HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};

use context_recall_core::store::memory::{InMemoryBackend, InMemoryContentStore};
use context_recall_core::store::{ContentStore, VectorBackend};

use crate::chroma::ChromaBackend;
use crate::config::Config;
use crate::content_store::SqliteContentStore;
use crate::embedder::Embedder;
use crate::embedding::create_provider;
use crate::orchestrator::RetrievalOrchestrator;
use crate::retriever::{ContentRetriever, MemoryRetriever, SemanticRetriever, TemporalRetriever};
use crate::vector_store::VectorStoreGateway;

pub struct Services {
    pub config: Config,
    pub vectors: Arc<VectorStoreGateway>,
    pub content: Arc<dyn ContentStore>,
    pub orchestrator: RetrievalOrchestrator,
}

impl Services {
    /// Build from config, opening the SQLite content store on disk.
    pub async fn build(config: Config) -> Result<Self> {
        if config.vector_store.is_ephemeral() {
            tracing::warn!(
                content_store = %config.content_store.path.display(),
                "vector_store.backend is \"memory\"; vectors are lost on exit and \
                 later searches only see content store hits"
            );
        }
        let content: Arc<dyn ContentStore> =
            Arc::new(SqliteContentStore::open(&config.content_store.path).await?);
        Self::with_content_store(config, content)
    }

    /// Build with a caller-supplied content store.
    pub fn with_content_store(config: Config, content: Arc<dyn ContentStore>) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let embedder = Arc::new(Embedder::new(provider, &config.embedding));

        let backend: Arc<dyn VectorBackend> = match config.vector_store.backend.as_str() {
            "chroma" => Arc::new(ChromaBackend::new(
                &config.vector_store,
                Duration::from_secs(config.embedding.timeout_secs),
            )?),
            "memory" => Arc::new(InMemoryBackend::new()),
            other => bail!("Unknown vector_store.backend: {}", other),
        };
        let vectors = Arc::new(VectorStoreGateway::new(
            backend,
            config.vector_store.collection.clone(),
            embedder,
            config.vector_store.upsert_batch_size,
        ));

        let multiplier = config.retrieval.candidate_multiplier;
        let orchestrator = RetrievalOrchestrator::new(config.retrieval.retriever_timeout())
            .register(Arc::new(TemporalRetriever::new(
                vectors.clone(),
                content.clone(),
                multiplier,
            )))
            .register(Arc::new(SemanticRetriever::new(
                vectors.clone(),
                config.retrieval.include_lexical,
                multiplier,
            )))
            .register(Arc::new(MemoryRetriever::new(vectors.clone(), multiplier)))
            .register(Arc::new(ContentRetriever::new(content.clone(), multiplier)));

        tracing::info!(
            provider = %config.embedding.provider,
            vector_backend = %config.vector_store.backend,
            collection = %config.vector_store.collection,
            retrievers = ?orchestrator.retriever_names(),
            "services ready"
        );

        Ok(Self {
            config,
            vectors,
            content,
            orchestrator,
        })
    }

    /// Everything in memory, for tests and local experiments.
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_content_store(config, Arc::new(InMemoryContentStore::new()))
    }
}
