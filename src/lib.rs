//! # Context Recall
//!
//! Retrieval over a user's own content: chunked, embedded, and searched
//! through several failure-isolated retrievers whose results are merged
//! into one ranked response.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────────┐
//! │ SourceDoc  │──▶│ Chunk+Embed  │──▶│ Vector store       │
//! │ (ingest)   │   │ (Embedder)   │   │ (Chroma / memory)  │
//! └────────────┘   └──────┬───────┘   └─────────┬──────────┘
//!                         └──────────▶ SQLite FTS5 content store
//!                                               │
//!                        ┌──────────────────────┤
//!                        ▼                      ▼
//!                 ┌─────────────┐        ┌─────────────┐
//!                 │ Retrievers  │──────▶ │ Orchestrator│──▶ CLI / HTTP
//!                 └─────────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init
//! recall ingest notes.md --app notes --user u1 --source notion
//! recall search "launch plan" --user u1 --since 2024-05-01
//! recall serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding provider implementations |
//! | [`embedder`] | Token-bounded, batched embedding |
//! | [`chroma`] | Chroma HTTP vector backend |
//! | [`vector_store`] | Vector store gateway |
//! | [`lexical`] | "Document contains" search |
//! | [`hybrid`] | Vector + lexical RRF fusion |
//! | [`content_store`] | SQLite durable content store |
//! | [`retriever`] | Temporal, semantic, memory, and content retrievers |
//! | [`query_analysis`] | Query analysis seam |
//! | [`orchestrator`] | Concurrent retrieval and result merging |
//! | [`ingest`] | Ingestion pipeline |
//! | [`services`] | Component wiring from config |
//! | [`server`] | HTTP retrieval endpoint |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chroma;
pub mod config;
pub mod content_store;
pub mod db;
pub mod embedder;
pub mod embedding;
pub mod hybrid;
pub mod ingest;
pub mod lexical;
pub mod migrate;
pub mod orchestrator;
pub mod query_analysis;
pub mod retriever;
pub mod server;
pub mod services;
pub mod vector_store;
