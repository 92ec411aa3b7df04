//! HTTP retrieval endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/retrieve` | Run a [`RetrievalRequest`], return a [`RetrievalResponse`] |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Only request validation produces an error. Retriever failures degrade to
//! fewer results; they never surface as an HTTP error.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use context_recall_core::models::{RetrievalRequest, RetrievalResponse};

use crate::services::Services;

#[derive(Clone)]
struct AppState {
    services: Arc<Services>,
}

/// Serve until the process is terminated.
pub async fn run_server(services: Services) -> anyhow::Result<()> {
    let bind_addr = services.config.server.bind.clone();
    let app = router(Arc::new(services));

    tracing::info!(bind = %bind_addr, "retrieval server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(services: Arc<Services>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/retrieve", post(handle_retrieve))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { services })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /retrieve ============

/// `max_results` is capped at `[retrieval].final_limit`.
async fn handle_retrieve(
    State(state): State<AppState>,
    Json(mut request): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResponse>, AppError> {
    if request.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    if request.max_results == 0 {
        return Err(bad_request("max_results must be > 0"));
    }
    let final_limit = state.services.config.retrieval.final_limit;
    request.max_results = request.max_results.min(final_limit);

    let response = state.services.orchestrator.retrieve(&request).await;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::vector_store::VectorDocument;
    use context_recall_core::models::{keys, Metadata};
    use serde_json::json;

    async fn state() -> AppState {
        let config = parse_config(
            r#"
            [embedding]
            provider = "hash"
            dims = 32

            [retrieval]
            final_limit = 5
            "#,
        )
        .unwrap();
        let services = Services::in_memory(config).unwrap();
        let docs = (0..8)
            .map(|i| {
                let mut metadata = Metadata::new();
                metadata.insert(keys::USER_ID.into(), json!("u1"));
                metadata.insert(keys::SOURCE_TYPE.into(), json!("notion"));
                VectorDocument {
                    id: format!("doc-{}", i),
                    text: format!("meeting notes number {}", i),
                    metadata,
                    embedding: None,
                }
            })
            .collect();
        services.vectors.upsert(docs).await.unwrap();
        AppState {
            services: Arc::new(services),
        }
    }

    #[tokio::test]
    async fn test_retrieve_caps_at_final_limit() {
        let request: RetrievalRequest =
            serde_json::from_value(json!({ "query": "meeting notes", "user_id": "u1" })).unwrap();
        let Json(response) = handle_retrieve(State(state().await), Json(request))
            .await
            .ok()
            .unwrap();
        assert_eq!(response.total_results, 5);
        assert!(response.memories.is_empty());
        assert_eq!(response.content.len(), 5);
    }

    #[tokio::test]
    async fn test_blank_query_is_bad_request() {
        let request = RetrievalRequest::new("  ", "u1");
        let err = handle_retrieve(State(state().await), Json(request))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "bad_request");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(health) = handle_health().await;
        assert_eq!(health.status, "ok");
    }
}
