//! The request router and action handlers.
//!
//! Requests are framework-agnostic `{path, method, headers, body}` values;
//! an axum catch-all adapts HTTP to them, so the dispatch table and every
//! handler stay directly testable. The first path segment selects the
//! action. All non-terminal outcomes (including inner 403/405 error
//! objects) serialize into an HTTP 200; the only hard failures are the
//! two "Invalid path" 500s for an empty path or an unknown action.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use catalog::artists::{ArtistDirectory, GenreStore};
use catalog::records::{value_as_i64, value_truthy};
use catalog::store::Table;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::ApiConfig;
use crate::curation::{curate, GalleryQuery};
use crate::error::ApiError;
use crate::image_search::{is_explicit_thumbnail, search_page_url, ImageSearch};
use crate::selection::{ImageId, Selector};
use crate::snapshot::SnapshotCache;
use crate::trigger::GenerationTrigger;

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

impl ApiResponse {
    fn ok(value: Value) -> Self {
        Self {
            status_code: 200,
            body: serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    fn invalid_path() -> Self {
        Self {
            status_code: 500,
            body: "Invalid path".to_string(),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub images: Arc<dyn Table>,
    pub artists_table: Arc<dyn Table>,
    pub directory: Arc<ArtistDirectory>,
    pub genres: Arc<GenreStore>,
    pub cache: Arc<SnapshotCache>,
    pub search: Arc<dyn ImageSearch>,
    pub trigger: Arc<dyn GenerationTrigger>,
    pub search_endpoint: String,
    pub search_default_limit: i64,
    pub dev_mode: bool,
}

impl AppState {
    fn selector(&self) -> Selector {
        Selector::new(self.images.clone(), self.directory.clone())
    }
}

/// Route one request through the action table.
#[instrument(skip(state, request), fields(path = %request.path, method = %request.method))]
pub async fn dispatch(state: &AppState, request: &ApiRequest) -> ApiResponse {
    state.cache.refresh_if_stale().await;

    let mut segments = request.path.split('/').filter(|s| !s.is_empty());
    let Some(action) = segments.next() else {
        return ApiResponse::invalid_path();
    };
    let method = request.method.as_str();
    let body = &request.body;
    let query = GalleryQuery::from_body(body);

    metrics::counter!("gallery.requests", "action" => action.to_string()).increment(1);

    let output = match action {
        "get" => match segments.next() {
            Some(segment) => match ImageId::parse(segment) {
                Some(image_id) => get_image(state, image_id, &query).await,
                None => Err(ApiError::Forbidden),
            },
            None if method == "POST" => get_random(state, &query).await,
            None => Err(ApiError::MethodNotAllowed),
        },
        "get_latest" => match method {
            "POST" => get_latest(state, &query).await,
            _ => Err(ApiError::MethodNotAllowed),
        },
        "get_artists" => match method {
            "GET" => get_artists(state),
            _ => Err(ApiError::MethodNotAllowed),
        },
        "get_artist" => match method {
            "POST" => get_artist(state, body),
            _ => Err(ApiError::MethodNotAllowed),
        },
        "get_genre_list" => match method {
            "GET" => get_genre_list(state).await,
            _ => Err(ApiError::MethodNotAllowed),
        },
        "get_genres" => match method {
            "POST" => get_genres(state, body).await,
            _ => Err(ApiError::MethodNotAllowed),
        },
        "save_genre" => match method {
            "POST" | "PUT" if state.dev_mode => save_genre(state, body).await,
            "POST" | "PUT" => Err(ApiError::Forbidden),
            _ => Err(ApiError::MethodNotAllowed),
        },
        "delete_genre" => match method {
            "DELETE" if state.dev_mode => delete_genre(state, body).await,
            "DELETE" => Err(ApiError::Forbidden),
            _ => Err(ApiError::MethodNotAllowed),
        },
        "get_search_results" => match method {
            "POST" => get_search_results(state, body, &query).await,
            _ => Err(ApiError::MethodNotAllowed),
        },
        "counts" => match method {
            "GET" => counts(state).await,
            _ => Err(ApiError::MethodNotAllowed),
        },
        "generate" => match method {
            "POST" if state.dev_mode => generate(state, body).await,
            "POST" => Err(ApiError::Forbidden),
            _ => Err(ApiError::MethodNotAllowed),
        },
        "set_score" => match method {
            "PUT" if state.dev_mode => set_score(state, body).await,
            "PUT" => Err(ApiError::Forbidden),
            _ => Err(ApiError::MethodNotAllowed),
        },
        _ => return ApiResponse::invalid_path(),
    };

    ApiResponse::ok(output.unwrap_or_else(|e| e.body()))
}

async fn get_image(
    state: &AppState,
    image_id: ImageId,
    query: &GalleryQuery,
) -> Result<Value, ApiError> {
    let snapshot = state.cache.snapshot();
    let curated = curate(&snapshot, query);
    let mut rng = StdRng::from_entropy();
    state
        .selector()
        .get_image(curated, image_id, query, &mut rng)
        .await
}

async fn get_random(state: &AppState, query: &GalleryQuery) -> Result<Value, ApiError> {
    let snapshot = state.cache.snapshot();
    let curated = curate(&snapshot, query);
    let mut rng = StdRng::from_entropy();
    state
        .selector()
        .get_random(&curated, query.limit.unwrap_or(1), &mut rng)
        .await
}

async fn get_latest(state: &AppState, query: &GalleryQuery) -> Result<Value, ApiError> {
    let snapshot = state.cache.snapshot();
    let curated = curate(&snapshot, query);
    state
        .selector()
        .get_latest(curated, query.offset, query.limit)
        .await
}

fn get_artists(state: &AppState) -> Result<Value, ApiError> {
    let artists: Vec<Value> = state
        .directory
        .all()
        .iter()
        .map(|artist| {
            json!({
                "id": artist.id,
                "searchable_name": artist.searchable_name(),
                "sort_name": artist.sort_name,
            })
        })
        .collect();
    Ok(json!({
        "status": "success",
        "artists": artists,
        "total": artists.len(),
    }))
}

/// Resolve an artist from a body carrying artist_id or artist (name).
fn resolve_artist(state: &AppState, body: &Value) -> Result<catalog::Artist, ApiError> {
    if let Some(artist_id) = body.get("artist_id").and_then(Value::as_str) {
        return state
            .directory
            .get_by_id(artist_id)
            .ok_or_else(|| ApiError::NotFound(format!("Artist '{artist_id}' not found")));
    }
    if let Some(name) = body.get("artist").and_then(Value::as_str) {
        return state
            .directory
            .get_by_name(name)
            .ok_or_else(|| ApiError::NotFound(format!("Artist '{name}' not found")));
    }
    Err(ApiError::Validation("Missing 'artist_id' argument".into()))
}

fn get_artist(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let artist = resolve_artist(state, body)?;
    Ok(json!({ "status": "success", "artist": artist.data }))
}

async fn get_genre_list(state: &AppState) -> Result<Value, ApiError> {
    let genres = state.genres.list_all().await?;
    Ok(json!({
        "status": "success",
        "genres": genres,
        "total": genres.len(),
    }))
}

async fn get_genres(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let artist_id = body
        .get("artist_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("Missing 'artist_id' argument".into()))?;
    if state.directory.get_by_id(artist_id).is_none() {
        return Err(ApiError::NotFound(format!("Artist '{artist_id}' not found")));
    }
    let genres: Vec<Value> = state
        .genres
        .list_for_artist(artist_id)
        .await?
        .into_iter()
        .map(|g| g.data)
        .collect();
    Ok(json!({
        "status": "success",
        "genres": genres,
        "total": genres.len(),
    }))
}

fn require_genre_key(body: &Value) -> Result<(&str, &str), ApiError> {
    let artist_id = body
        .get("artist_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("Missing 'artist_id' argument".into()))?;
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation("Missing 'name' argument".into()))?;
    Ok((artist_id, name))
}

async fn save_genre(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let (artist_id, name) = require_genre_key(body)?;
    if state.directory.get_by_id(artist_id).is_none() {
        return Err(ApiError::NotFound(format!("Artist '{artist_id}' not found")));
    }
    state
        .genres
        .save(artist_id, name, body)
        .await
        .map_err(|_| ApiError::Upstream("Failed to save genre".into()))?;
    Ok(json!({ "status": "success" }))
}

async fn delete_genre(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let (artist_id, name) = require_genre_key(body)?;
    if state.directory.get_by_id(artist_id).is_none() {
        return Err(ApiError::NotFound(format!("Artist '{artist_id}' not found")));
    }
    let deleted = state
        .genres
        .delete(artist_id, name)
        .await
        .map_err(|_| ApiError::Upstream("Failed to delete genre".into()))?;
    if !deleted {
        return Err(ApiError::Upstream("Failed to delete genre".into()));
    }
    Ok(json!({ "status": "success" }))
}

async fn get_search_results(
    state: &AppState,
    body: &Value,
    query: &GalleryQuery,
) -> Result<Value, ApiError> {
    let artist = resolve_artist(state, body)?;
    let keywords = format!("artwork by {}", artist.name);
    let limit = query.limit.unwrap_or(state.search_default_limit).max(1) as usize;

    // Over-fetch so the explicit-content filter can still fill the page.
    let raw = state
        .search
        .search_images(&keywords, limit.saturating_mul(2))
        .await?;
    let images: Vec<Value> = raw
        .into_iter()
        .filter(|result| {
            result
                .get("thumbnail")
                .and_then(Value::as_str)
                .map(|url| !is_explicit_thumbnail(url))
                .unwrap_or(true)
        })
        .take(limit)
        .collect();

    Ok(json!({
        "status": "success",
        "artist": { "id": artist.id, "name": artist.name },
        "images": images,
        "url": search_page_url(&state.search_endpoint, &keywords),
        "total": images.len(),
    }))
}

async fn counts(state: &AppState) -> Result<Value, ApiError> {
    let snapshot = state.cache.snapshot();
    let mut images = 0i64;
    let mut fails = 0i64;
    for record in snapshot.iter() {
        if record.nsfw {
            continue;
        }
        match record.score {
            Some(1) => fails += 1,
            Some(score) if score < 3 => {}
            _ => images += 1,
        }
    }
    let artists = state.artists_table.item_count().await?;
    Ok(json!({
        "status": "success",
        "images": images,
        "artists": artists,
        "fails": fails,
    }))
}

async fn generate(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let artist = match body.get("artist_id").and_then(Value::as_str) {
        Some(artist_id) => Some(
            state
                .directory
                .get_by_id(artist_id)
                .ok_or_else(|| ApiError::NotFound(format!("Artist '{artist_id}' not found")))?
                .name,
        ),
        None => body
            .get("artist")
            .and_then(Value::as_str)
            .map(str::to_string),
    };

    state
        .trigger
        .dispatch(json!({
            "artist": artist,
            "genre": body.get("genre").and_then(Value::as_str),
        }))
        .await?;

    Ok(json!({ "status": "success" }))
}

async fn set_score(state: &AppState, body: &Value) -> Result<Value, ApiError> {
    let filename = body.get("filename").and_then(Value::as_str).unwrap_or("");
    let create_time = body.get("create_time").and_then(Value::as_str).unwrap_or("");
    if filename.is_empty() || create_time.is_empty() {
        return Err(ApiError::Validation(
            "Missing 'filename' and 'create_time' arguments.".into(),
        ));
    }

    let snapshot = state.cache.snapshot();
    let record = snapshot
        .iter()
        .find(|r| r.filename == filename)
        .ok_or_else(|| ApiError::NotFound(format!("No records matching '{filename}'")))?;

    let mut patch = Map::new();
    patch.insert("filename".into(), json!(filename));
    patch.insert("create_time".into(), json!(create_time));
    patch.insert(
        "nsfw".into(),
        json!(body.get("nsfw").map(value_truthy).unwrap_or(false)),
    );
    if let Some(score) = body.get("score").and_then(value_as_i64) {
        patch.insert("score".into(), json!(score));
    }
    let patch = Value::Object(patch);

    let saved = state.images.update_item(&patch).await?;
    if !saved {
        return Err(ApiError::Upstream("Failed to save changes to database".into()));
    }

    // The write went through: reload this process's snapshot so the very
    // next curation pass sees it. A failed reload degrades to stale reads.
    state.cache.invalidate();
    state.cache.refresh_if_stale().await;

    let updated = state
        .cache
        .snapshot()
        .iter()
        .find(|r| r.filename == filename)
        .map(|r| r.to_item())
        .unwrap_or_else(|| {
            let mut item = record.to_item();
            if let (Some(target), Some(source)) = (item.as_object_mut(), patch.as_object()) {
                for (k, v) in source {
                    target.insert(k.clone(), v.clone());
                }
            }
            item
        });

    info!(filename = %filename, "Score updated");
    Ok(json!({ "status": "success", "image": updated }))
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "gallery-service"
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
        json!({})
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}))
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
    let content_type = if response.status_code == 500 {
        "text/plain"
    } else {
        "application/json"
    };
    axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(response.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Start the gallery API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting gallery API server");

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
    use crate::image_search::MockImageSearch;
    use crate::trigger::MockGenerationTrigger;
    use catalog::memory::MemoryTable;
    use catalog::records::VersionCutovers;
    use catalog::signal::TableSignal;
    use std::time::Duration;

    fn image_items() -> Vec<Value> {
        vec![
            json!({
                "filename": "gogh-1.png",
                "create_time": "2023-09-01T12:00:00",
                "aspect_ratio": 0.68,
                "score": 4,
                "query-artist_id": "vincent_van_gogh",
                "query-artist_name": "Vincent van Gogh",
                "query-subject": "wheat fields",
                "query-style": "post-impressionism"
            }),
            json!({
                "filename": "cassatt-1.png",
                "create_time": "2023-09-02T12:00:00",
                "aspect_ratio": 1.46,
                "query-artist_id": "mary_cassatt",
                "query-artist_name": "Mary Cassatt"
            }),
            json!({
                "filename": "flagged.png",
                "create_time": "2023-09-03T12:00:00",
                "aspect_ratio": 1.0,
                "nsfw": true,
                "score": 1
            }),
        ]
    }

    async fn test_state(dev_mode: bool) -> AppState {
        let images: Arc<dyn Table> = Arc::new(MemoryTable::with_items(
            "filename",
            Some("create_time"),
            image_items(),
        ));
        let artists_table: Arc<dyn Table> = Arc::new(MemoryTable::with_items(
            "id",
            None,
            vec![
                json!({
                    "id": "vincent_van_gogh",
                    "name": "Vincent van Gogh",
                    "sort_name": "Gogh, Vincent van"
                }),
                json!({
                    "id": "mary_cassatt",
                    "name": "Mary Cassatt",
                    "sort_name": "Cassatt, Mary"
                }),
            ],
        ));
        let control: Arc<dyn Table> = Arc::new(MemoryTable::new("name", None));

        let directory = Arc::new(ArtistDirectory::new(artists_table.clone()));
        directory.load().await.unwrap();

        let cache = Arc::new(SnapshotCache::new(
            images.clone(),
            Arc::new(TableSignal::new(control, "images")),
            VersionCutovers::default(),
            Duration::from_secs(300),
        ));
        cache.load().await.unwrap();

        AppState {
            images,
            artists_table: artists_table.clone(),
            directory,
            genres: Arc::new(GenreStore::new(Arc::new(MemoryTable::new(
                "artist_id",
                Some("name"),
            )))),
            cache,
            search: Arc::new(MockImageSearch::new()),
            trigger: Arc::new(MockGenerationTrigger::new()),
            search_endpoint: "https://duckduckgo.com".to_string(),
            search_default_limit: 8,
            dev_mode,
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

    fn parse(response: &ApiResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_path_is_terminal_500() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("GET", "/nope", json!({}))).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "Invalid path");

        let response = dispatch(&state, &request("GET", "/", json!({}))).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(response.body, "Invalid path");
    }

    #[tokio::test]
    async fn test_wrong_method_is_inner_405() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("GET", "/get_latest", json!({}))).await;
        assert_eq!(response.status_code, 200);
        assert_eq!(
            parse(&response),
            json!({"status": 405, "error": "Method not allowed"})
        );
    }

    #[tokio::test]
    async fn test_dev_gate_outside_dev() {
        let state = test_state(false).await;
        for (method, path) in [
            ("PUT", "/set_score"),
            ("POST", "/generate"),
            ("POST", "/save_genre"),
            ("DELETE", "/delete_genre"),
        ] {
            let response = dispatch(&state, &request(method, path, json!({}))).await;
            assert_eq!(response.status_code, 200);
            assert_eq!(
                parse(&response),
                json!({"status": 403, "error": "Forbidden"}),
                "{method} {path}"
            );
        }
    }

    #[tokio::test]
    async fn test_malformed_image_id_is_forbidden() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("GET", "/get/12345", json!({}))).await;
        assert_eq!(
            parse(&response),
            json!({"status": 403, "error": "Forbidden"})
        );
    }

    #[tokio::test]
    async fn test_get_latest_flow() {
        let state = test_state(false).await;

        // No offset: normalized to the total, window clamped to the oldest.
        let response = dispatch(
            &state,
            &request("POST", "/get_latest", json!({"limit": 2})),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["total"], json!(3));
        assert_eq!(body["offset"], json!(3));
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0]["filename"], json!("gogh-1.png"));

        // Offset 1: the newest records, walking backward.
        let response = dispatch(
            &state,
            &request("POST", "/get_latest", json!({"offset": 1, "limit": 2})),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["offset"], json!(1));
        let images = body["images"].as_array().unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0]["filename"], json!("flagged.png"));
        assert_eq!(images[1]["filename"], json!("cassatt-1.png"));
    }

    #[tokio::test]
    async fn test_get_by_id_joins_artist() {
        let state = test_state(false).await;
        let id = catalog::records::parse_create_time("2023-09-01T12:00:00").unwrap();
        let response = dispatch(
            &state,
            &request("GET", &format!("/get/{id}"), json!({})),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["image"]["artist"]["name"], json!("Vincent van Gogh"));
        assert_eq!(body["total"], json!(3));
    }

    #[tokio::test]
    async fn test_get_artists_listing() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("GET", "/get_artists", json!({}))).await;
        let body = parse(&response);
        assert_eq!(body["total"], json!(2));
        let artists = body["artists"].as_array().unwrap();
        assert_eq!(artists[0]["searchable_name"], json!("vincent van gogh"));
    }

    #[tokio::test]
    async fn test_get_artist_validation_and_not_found() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("POST", "/get_artist", json!({}))).await;
        assert_eq!(
            parse(&response),
            json!({"status": "error", "message": "Missing 'artist_id' argument"})
        );

        let response = dispatch(
            &state,
            &request("POST", "/get_artist", json!({"artist_id": "rembrandt"})),
        )
        .await;
        assert_eq!(
            parse(&response),
            json!({"status": "error", "message": "Artist 'rembrandt' not found"})
        );
    }

    #[tokio::test]
    async fn test_counts_bucketing() {
        let state = test_state(false).await;
        let response = dispatch(&state, &request("GET", "/counts", json!({}))).await;
        let body = parse(&response);
        // flagged.png is nsfw and skipped entirely; the unscored record and
        // the score-4 record both count as images.
        assert_eq!(body["images"], json!(2));
        assert_eq!(body["fails"], json!(0));
        assert_eq!(body["artists"], json!(2));
        assert_eq!(body["status"], json!("success"));
    }

    #[tokio::test]
    async fn test_set_score_round_trip() {
        let state = test_state(true).await;

        // Before: exact_score 5 matches nothing.
        let response = dispatch(
            &state,
            &request("POST", "/get", json!({"exact_score": 5})),
        )
        .await;
        assert_eq!(parse(&response)["total"], json!(0));

        let response = dispatch(
            &state,
            &request(
                "PUT",
                "/set_score",
                json!({
                    "filename": "cassatt-1.png",
                    "create_time": "2023-09-02T12:00:00",
                    "score": 5
                }),
            ),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["image"]["score"], json!(5));

        // The very next curation pass sees the new score.
        let response = dispatch(
            &state,
            &request("POST", "/get", json!({"exact_score": 5})),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["images"][0]["filename"], json!("cassatt-1.png"));
    }

    #[tokio::test]
    async fn test_set_score_missing_arguments() {
        let state = test_state(true).await;
        let response = dispatch(
            &state,
            &request("PUT", "/set_score", json!({"filename": "cassatt-1.png"})),
        )
        .await;
        assert_eq!(
            parse(&response),
            json!({
                "status": "error",
                "message": "Missing 'filename' and 'create_time' arguments."
            })
        );
    }

    #[tokio::test]
    async fn test_generate_dispatches_job() {
        let mut state = test_state(true).await;
        let mut trigger = MockGenerationTrigger::new();
        trigger
            .expect_dispatch()
            .withf(|payload| payload["artist"] == json!("Mary Cassatt"))
            .times(1)
            .returning(|_| Ok(()));
        state.trigger = Arc::new(trigger);

        let response = dispatch(
            &state,
            &request("POST", "/generate", json!({"artist_id": "mary_cassatt"})),
        )
        .await;
        assert_eq!(parse(&response), json!({"status": "success"}));
    }

    #[tokio::test]
    async fn test_get_search_results_filters_explicit() {
        let mut state = test_state(false).await;
        let mut search = MockImageSearch::new();
        search.expect_search_images().returning(|_, _| {
            Ok(vec![
                json!({"title": "ok", "thumbnail": "https://tse.bing.net/th?id=1"}),
                json!({"title": "bad", "thumbnail": "https://tse.explicit.bing.net/th?id=2"}),
            ])
        });
        state.search = Arc::new(search);

        let response = dispatch(
            &state,
            &request(
                "POST",
                "/get_search_results",
                json!({"artist_id": "mary_cassatt"}),
            ),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["status"], json!("success"));
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["images"][0]["title"], json!("ok"));
        assert_eq!(body["artist"]["name"], json!("Mary Cassatt"));
        assert!(body["url"].as_str().unwrap().contains("ia=images"));
    }

    #[tokio::test]
    async fn test_genre_crud_in_dev() {
        let state = test_state(true).await;
        let response = dispatch(
            &state,
            &request(
                "POST",
                "/save_genre",
                json!({
                    "artist_id": "mary_cassatt",
                    "name": "portraits",
                    "subject": "mother and child",
                    "style": "impressionism"
                }),
            ),
        )
        .await;
        assert_eq!(parse(&response), json!({"status": "success"}));

        let response = dispatch(
            &state,
            &request("POST", "/get_genres", json!({"artist_id": "mary_cassatt"})),
        )
        .await;
        let body = parse(&response);
        assert_eq!(body["total"], json!(1));
        assert_eq!(body["genres"][0]["subject"], json!("mother and child"));

        let response = dispatch(
            &state,
            &request(
                "DELETE",
                "/delete_genre",
                json!({"artist_id": "mary_cassatt", "name": "portraits"}),
            ),
        )
        .await;
        assert_eq!(parse(&response), json!({"status": "success"}));

        let response = dispatch(&state, &request("GET", "/get_genre_list", json!({}))).await;
        assert_eq!(parse(&response)["total"], json!(0));
    }
}
