//! The generator's request surface.
//!
//! One action: POST /generate runs a job synchronously and returns the
//! written record. Unlike the gallery router, error outcomes here are
//! translated to their HTTP status code; a failed generation is a real
//! 5xx to the invoker, not a 200 with an inner error object.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

use crate::config::ApiConfig;
use crate::orchestrator::{GenerateJob, Orchestrator};

/// A request, independent of the hosting framework.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

/// A response: status code plus serialized body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: String,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

/// Route one request: generate or nothing.
#[instrument(skip(state, request), fields(path = %request.path, method = %request.method))]
pub async fn dispatch(state: &AppState, request: &ApiRequest) -> ApiResponse {
    let mut segments = request.path.split('/').filter(|s| !s.is_empty());
    let Some(action) = segments.next() else {
        return ApiResponse {
            status_code: 500,
            body: "Invalid API".to_string(),
        };
    };

    match action {
        "generate" if request.method == "POST" => {
            let job: GenerateJob =
                serde_json::from_value(request.body.clone()).unwrap_or_default();
            let mut rng = StdRng::from_entropy();
            match state.orchestrator.run(&job, &mut rng).await {
                Ok(record) => ApiResponse {
                    status_code: 200,
                    body: serde_json::to_string(&record).unwrap_or_else(|_| "{}".to_string()),
                },
                Err(e) => {
                    error!(error = %e, "Generation failed");
                    ApiResponse {
                        status_code: 503,
                        body: e.to_string(),
                    }
                }
            }
        }
        "generate" => ApiResponse {
            status_code: 405,
            body: "Method not allowed".to_string(),
        },
        _ => ApiResponse {
            status_code: 500,
            body: "Invalid API".to_string(),
        },
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "generator-service"
    }))
}

/// Adapt an HTTP request to the framework-agnostic shape and back.
async fn handle_request(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> impl IntoResponse {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let bytes = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();
    let body: Value = if bytes.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| serde_json::json!({}))
    };

    let response = dispatch(
        &state,
        &ApiRequest {
            path,
            method,
            headers,
            body,
        },
    )
    .await;

    let status =
        StatusCode::from_u16(response.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let content_type = if response.status_code == 200 {
        "application/json"
    } else {
        "text/plain"
    };
    axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Start the generator API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let router = create_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting generator API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineRegistry;
    use crate::uploader::ArtifactSink;
    use async_trait::async_trait;
    use catalog::artists::{ArtistDirectory, GenreStore};
    use catalog::memory::MemoryTable;
    use catalog::signal::TableSignal;
    use serde_json::json;

    struct NoSink;

    #[async_trait]
    impl ArtifactSink for NoSink {
        async fn upload(
            &self,
            _artifact: &crate::engine::ImageArtifact,
        ) -> anyhow::Result<String> {
            anyhow::bail!("unused")
        }
    }

    async fn empty_state() -> AppState {
        // No artists and no engines: generation requests fail upstream,
        // which is all the routing tests need.
        let artists = Arc::new(MemoryTable::new("id", None));
        let directory = Arc::new(ArtistDirectory::new(artists));
        directory.load().await.unwrap();

        AppState {
            orchestrator: Arc::new(Orchestrator::new(
                directory,
                Arc::new(GenreStore::new(Arc::new(MemoryTable::new(
                    "artist_id",
                    Some("name"),
                )))),
                Arc::new(EngineRegistry::new()),
                Arc::new(NoSink),
                Arc::new(MemoryTable::new("filename", Some("create_time"))),
                Arc::new(TableSignal::new(Arc::new(MemoryTable::new("name", None)), "images")),
                "sdxl",
            )),
        }
    }

    fn request(method: &str, path: &str, body: Value) -> ApiRequest {
        ApiRequest {
            path: path.to_string(),
            method: method.to_string(),
            headers: HashMap::new(),
            body,
        }
    }

    #[tokio::test]
    async fn test_unknown_path_is_500() {
        let state = empty_state().await;
        let response = dispatch(&state, &request("POST", "/nope", json!({}))).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "Invalid API");
    }

    #[tokio::test]
    async fn test_wrong_method_is_405() {
        let state = empty_state().await;
        let response = dispatch(&state, &request("GET", "/generate", json!({}))).await;
        assert_eq!(response.status_code, 405);
        assert_eq!(response.body, "Method not allowed");
    }

    #[tokio::test]
    async fn test_failed_generation_is_503() {
        let state = empty_state().await;
        let response = dispatch(&state, &request("POST", "/generate", json!({}))).await;
        assert_eq!(response.status_code, 503);
        assert_eq!(response.body, "No artists are available for generation");
    }
}
