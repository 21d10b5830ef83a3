use crate::lookup::LookupPipeline;
use crate::storage::LocalStore;
use crate::types::{now_ms, CollectionSyncPayload, WordRecord};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::info;

type SharedState = Arc<AppState>;

/// Resolved word records stay valid on the server for a week.
const WORD_CACHE_TTL_MS: u64 = 7 * 24 * 3600 * 1000;

pub struct AppState {
    pub store: Arc<LocalStore>,
    pub pipeline: LookupPipeline,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub data_path: Option<std::path::PathBuf>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_path: None,
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let store = match &config.data_path {
        Some(path) => Arc::new(LocalStore::persistent(path.clone())),
        None => Arc::new(LocalStore::ephemeral()),
    };
    let pipeline = LookupPipeline::new(crate::cache::LookupCache::new(store.clone()), None);
    let state = Arc::new(AppState { store, pipeline });
    let router = build_router(state);
    info!(%config.addr, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(value: crate::error::Error) -> Self {
        match value {
            crate::error::Error::MissingUsername => ApiError::bad_request(value.to_string()),
            other => ApiError::internal(other.to_string()),
        }
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/word", get(api_word))
        .route("/api/collections", get(api_list_collections).post(api_sync_collections))
        .route("/api/collections/:word", axum::routing::delete(api_delete_collection))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "pagegloss-api" }))
}

#[derive(Debug, Deserialize)]
struct WordParams {
    word: Option<String>,
}

/// Word lookup. Works without a username; answers come from the weekly
/// server cache when fresh.
async fn api_word(
    State(state): State<SharedState>,
    Query(params): Query<WordParams>,
) -> Result<Json<WordRecord>, ApiError> {
    let word = params
        .word
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .ok_or_else(|| ApiError::bad_request("word is required"))?;

    if let Some(cached) = cached_word(&state.store, word) {
        return Ok(Json(cached));
    }
    let record = state.pipeline.lookup(word, None).await;
    put_cached_word(&state.store, word, &record).await?;
    Ok(Json(record))
}

async fn api_list_collections(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<HashMap<String, WordRecord>>, ApiError> {
    let username = require_username(&headers)?;
    Ok(Json(user_collections(&state.store, &username)))
}

/// Full-state sync: every pushed entry is upserted under the user, then
/// the merged map comes back as the authoritative state.
async fn api_sync_collections(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<CollectionSyncPayload>,
) -> Result<Json<HashMap<String, WordRecord>>, ApiError> {
    let username = require_username(&headers)?;
    let mut map = user_collections(&state.store, &username);
    for entry in payload.words {
        let word = entry.word.trim().to_lowercase();
        if word.is_empty() {
            continue;
        }
        let mut data = entry.data;
        data.collected_at = Some(entry.collected_at);
        map.insert(word, data);
    }
    state
        .store
        .set(&collections_key(&username), &map)
        .await?;
    info!(user = %username, collections = map.len(), "collections synced");
    Ok(Json(map))
}

async fn api_delete_collection(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(word): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let username = require_username(&headers)?;
    let mut map = user_collections(&state.store, &username);
    map.remove(&word.trim().to_lowercase());
    state
        .store
        .set(&collections_key(&username), &map)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

fn require_username(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("X-Username")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| crate::error::Error::MissingUsername.into())
}

fn collections_key(username: &str) -> String {
    format!("collections:{username}")
}

fn word_cache_key(word: &str) -> String {
    format!("word_cache:{}", word.to_lowercase())
}

#[derive(Debug, serde::Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedWord {
    data: WordRecord,
    expire_at: u64,
}

fn cached_word(store: &LocalStore, word: &str) -> Option<WordRecord> {
    let cached: CachedWord = store.get(&word_cache_key(word))?;
    if now_ms() >= cached.expire_at {
        return None;
    }
    Some(cached.data)
}

async fn put_cached_word(
    store: &LocalStore,
    word: &str,
    record: &WordRecord,
) -> crate::error::Result<()> {
    let cached = CachedWord {
        data: record.clone(),
        expire_at: now_ms() + WORD_CACHE_TTL_MS,
    };
    store.set(&word_cache_key(word), &cached).await
}

fn user_collections(store: &LocalStore, username: &str) -> HashMap<String, WordRecord> {
    store.get(&collections_key(username)).unwrap_or_default()
}
