//! Reel HTTP API
//!
//! Axum server for session ingestion, listing and replay. Each endpoint has a
//! thin axum handler that delegates to an inner function returning
//! `(StatusCode, body)`, so the behaviour is testable without going through
//! the router.
//!
//! Public (open to any origin):
//! - POST /api/sessions/metadata: register a session
//! - POST /api/sessions/events  : append a batch of events
//! - GET  /health               : DB status
//! - GET  /{recorder,capture,player} assets
//!
//! Admin (HTTP Basic):
//! - GET  /                       : landing page
//! - GET  /api/sessions?page=N    : paginated listing
//! - GET  /api/sessions/:id       : session with full event log
//! - GET  /session/:id            : replay view

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use reel_core::models::{Ack, EventBatch, SessionMetadata};
use reel_core::ReelConfig;
use reel_ingest::{SessionStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AdminCredentials};
use crate::pages;
use crate::replay::{ReplayEngine, RrwebPlayer};

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub store: SessionStore,
    pub config: ReelConfig,
    pub credentials: AdminCredentials,
    pub replay: Box<dyn ReplayEngine>,
}

impl HttpState {
    pub fn new(store: SessionStore, config: ReelConfig) -> Self {
        let credentials = AdminCredentials::from(&config.admin);
        let replay = Box::new(RrwebPlayer::new(
            &config.assets.capture_script,
            &config.assets.player_script,
            &config.assets.player_css,
        ));
        Self {
            store,
            config,
            credentials,
            replay,
        }
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let ingest = Router::new()
        .route("/api/sessions/metadata", post(metadata_handler))
        .route("/api/sessions/events", post(events_handler))
        .layer(cors);

    let admin = Router::new()
        .route("/", get(admin_handler))
        .route("/api/sessions", get(list_handler))
        .route("/api/sessions/:session_id", get(session_handler))
        .route("/session/:session_id", get(replay_handler))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_admin,
        ));

    let assets = asset_routes(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .merge(ingest)
        .merge(admin)
        .merge(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn asset_routes(config: &ReelConfig) -> Router<Arc<HttpState>> {
    let dir = Path::new(&config.assets.dir);
    let files = [
        &config.assets.recorder_script,
        &config.assets.capture_script,
        &config.assets.player_script,
        &config.assets.player_css,
    ];

    files.into_iter().fold(Router::new(), |router, name| {
        router.route_service(&format!("/{name}"), ServeFile::new(dir.join(name)))
    })
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    store: SessionStore,
    config: ReelConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState::new(store, config));

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Reel HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub page: Option<String>,
}

impl ListQuery {
    /// Missing or unparsable pages read as 1; clamping happens in the store.
    pub fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(1)
    }
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn body(msg: impl Into<String>) -> serde_json::Value {
        serde_json::to_value(Self::new(msg)).unwrap_or_default()
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check: queries DB and returns (status_code, json_body).
pub async fn health_inner(store: &SessionStore) -> (StatusCode, serde_json::Value) {
    match reel_core::db::health_check(store.pool()).await {
        Ok(version) => (
            StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "sqlite": version,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }),
        ),
    }
}

/// Inner metadata submission: parses the raw body so a wrong or missing
/// content type still reaches validation.
pub async fn metadata_inner(store: &SessionStore, body: &[u8]) -> (StatusCode, serde_json::Value) {
    let metadata: SessionMetadata = match serde_json::from_slice(body) {
        Ok(m) => m,
        Err(e) => {
            tracing::debug!("Rejected metadata payload: {}", e);
            return (StatusCode::BAD_REQUEST, ErrorResponse::body("Invalid JSON"));
        }
    };

    match store.submit_metadata(&metadata).await {
        Ok(()) => {
            tracing::info!(session_id = %metadata.session_id, url = %metadata.url, "Session registered");
            ok_ack()
        }
        Err(e) => store_error(e, "saving session metadata"),
    }
}

/// Inner event append.
pub async fn events_inner(store: &SessionStore, body: &[u8]) -> (StatusCode, serde_json::Value) {
    let batch: EventBatch = match serde_json::from_slice(body) {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!("Rejected event batch: {}", e);
            return (StatusCode::BAD_REQUEST, ErrorResponse::body("Invalid JSON"));
        }
    };

    match store.append_batch(&batch).await {
        Ok(total) => {
            tracing::debug!(
                session_id = %batch.session_id,
                appended = batch.events.len(),
                total,
                "Batch stored"
            );
            ok_ack()
        }
        Err(e) => store_error(e, "appending session events"),
    }
}

/// Inner listing.
pub async fn list_inner(store: &SessionStore, query: &ListQuery) -> (StatusCode, serde_json::Value) {
    match store.list_sessions(query.page()).await {
        Ok(page) => match serde_json::to_value(page) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => store_error(e.into(), "encoding session listing"),
        },
        Err(e) => store_error(e, "listing sessions"),
    }
}

/// Inner single-session retrieval with the full event log.
pub async fn session_inner(store: &SessionStore, session_id: &str) -> (StatusCode, serde_json::Value) {
    match store.get_session(session_id).await {
        Ok(detail) => match serde_json::to_value(detail) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => store_error(e.into(), "encoding session"),
        },
        Err(e) => store_error(e, "loading session"),
    }
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.store).await;
    (status, Json(body))
}

pub async fn metadata_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> impl IntoResponse {
    let (status, body) = metadata_inner(&state.store, &body).await;
    (status, Json(body))
}

pub async fn events_handler(State(state): State<Arc<HttpState>>, body: Bytes) -> impl IntoResponse {
    let (status, body) = events_inner(&state.store, &body).await;
    (status, Json(body))
}

pub async fn list_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let (status, body) = list_inner(&state.store, &query).await;
    (status, Json(body))
}

pub async fn session_handler(
    State(state): State<Arc<HttpState>>,
    UrlPath(session_id): UrlPath<String>,
) -> impl IntoResponse {
    let (status, body) = session_inner(&state.store, &session_id).await;
    (status, Json(body))
}

pub async fn admin_handler() -> Response {
    match pages::admin_page() {
        Ok(html) => Html(html).into_response(),
        Err(e) => template_error(e),
    }
}

pub async fn replay_handler(
    State(state): State<Arc<HttpState>>,
    UrlPath(session_id): UrlPath<String>,
) -> Response {
    let session = match state.store.get_session(&session_id).await {
        Ok(s) => s,
        Err(e) => {
            let (status, _) = store_error(e, "loading session for replay");
            let message = if status == StatusCode::NOT_FOUND {
                "Session not found"
            } else {
                "Internal server error"
            };
            return (status, message).into_response();
        }
    };

    match pages::replay_page(state.replay.as_ref(), &session) {
        Ok(html) => Html(html).into_response(),
        Err(e) => template_error(e),
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ok_ack() -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::to_value(Ack::ok()).unwrap_or_default(),
    )
}

/// Map a store error onto the response taxonomy: unknown session 404,
/// validation 400, everything else 500 (logged).
pub fn store_error(err: StoreError, action: &str) -> (StatusCode, serde_json::Value) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorResponse::body("Session not found")),
        StoreError::Validation(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::body(msg)),
        other => {
            tracing::error!("Error {}: {}", action, other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::body("Internal server error"),
            )
        }
    }
}

fn template_error(err: minijinja::Error) -> Response {
    tracing::error!("Template error: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
