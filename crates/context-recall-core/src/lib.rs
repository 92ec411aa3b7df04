//! # Context Recall Core
//!
//! Runtime-free logic for Context Recall: data models, chunking, text
//! sanitization, vector math, metadata filters, rank fusion, recency
//! boosting, result merging, and the backend traits the application crate
//! implements (vector collections, durable content stores, embedding
//! providers).
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Every
//! backend trait ships with an in-memory implementation in [`store::memory`]
//! and [`embedding::HashEmbeddingProvider`] so retrieval logic can be
//! exercised without any external service.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod fusion;
pub mod merge;
pub mod models;
pub mod recency;
pub mod sanitize;
pub mod store;

pub use error::{RecallError, Result};
