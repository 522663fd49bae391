//! Route definitions and router setup
//!
//! A thin HTTP surface over the sync pipeline and chat: register/list/delete
//! connections, trigger a manual sync, look up snapshots, poll doc-generation
//! status, ask questions. The dashboard's richer CRUD/export surface lives
//! elsewhere.

use crate::analysis::JobStatus;
use crate::chat::ChatReply;
use crate::config::Settings;
use crate::error::{ApiResult, AppError};
use crate::models::{Connection, Credentials, Snapshot};
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    http::{header, Method},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;
use uuid::Uuid;
use validator::Validate;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        .route("/api/connections", post(register_connection))
        .route("/api/connections", get(list_connections))
        .route("/api/connections/{id}", delete(delete_connection))
        .route("/api/connections/{id}/sync", post(sync_connection))
        .route("/api/connections/{id}/snapshots/latest", get(latest_snapshot))
        .route("/api/snapshots/{id}", get(get_snapshot))
        .route("/api/doc-status/{snapshot_id}", get(doc_status))
        .route("/api/chat", post(chat))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterConnectionRequest {
    #[validate(length(min = 1, message = "Connection name is required"))]
    pub name: String,
    #[serde(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub success: bool,
    pub connection: Connection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionListResponse {
    pub success: bool,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Refresh this snapshot in place instead of creating a new version.
    pub snapshot_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub snapshot_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResponse {
    pub success: bool,
    pub snapshot: Snapshot,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "Question is required"))]
    pub question: String,
    pub snapshot_id: Uuid,
    pub session_id: Option<String>,
}

// ==================== Handlers ====================

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "service": "datalens-sync",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn register_connection(
    State(state): State<SharedState>,
    Json(req): Json<RegisterConnectionRequest>,
) -> ApiResult<Json<ConnectionResponse>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let connection = state
        .connections
        .register(Connection {
            id: Uuid::new_v4(),
            name: req.name,
            credentials: req.credentials,
            created_at: Utc::now(),
            last_synced_at: None,
        })
        .await?;

    Ok(Json(ConnectionResponse {
        success: true,
        connection,
    }))
}

async fn list_connections(
    State(state): State<SharedState>,
) -> ApiResult<Json<ConnectionListResponse>> {
    let connections = state.connections.list().await?;
    Ok(Json(ConnectionListResponse {
        success: true,
        connections,
    }))
}

/// Delete a connection; its snapshots go with it.
async fn delete_connection(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.connections.delete(id).await? {
        return Err(AppError::NotFound(format!("Connection {} not found", id)));
    }
    let removed = state.snapshots.delete_for_connection(id).await?;

    Ok(Json(serde_json::json!({
        "success": true,
        "snapshotsRemoved": removed,
    })))
}

/// Manual sync: always produces (or refreshes) a snapshot, unlike the
/// scheduler which persists only on detected change.
async fn sync_connection(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    body: Option<Json<SyncRequest>>,
) -> ApiResult<Json<SyncResponse>> {
    let connection = state
        .connections
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection {} not found", id)))?;

    let Json(req) = body.unwrap_or_default();
    let snapshot_id = state.orchestrator.run(&connection, req.snapshot_id).await?;

    Ok(Json(SyncResponse {
        success: true,
        snapshot_id,
    }))
}

async fn get_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SnapshotResponse>> {
    let snapshot = state
        .snapshots
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Snapshot {} not found", id)))?;

    Ok(Json(SnapshotResponse {
        success: true,
        snapshot,
    }))
}

async fn latest_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SnapshotResponse>> {
    let snapshot = state
        .snapshots
        .most_recent(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No snapshots for connection {}", id)))?;

    Ok(Json(SnapshotResponse {
        success: true,
        snapshot,
    }))
}

/// Proxy doc-generation progress from the analysis service.
async fn doc_status(
    State(state): State<SharedState>,
    Path(snapshot_id): Path<Uuid>,
) -> ApiResult<Json<JobStatus>> {
    let status = state.analysis.job_status(snapshot_id).await?;
    Ok(Json(status))
}

async fn chat(
    State(state): State<SharedState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let reply = state
        .chat
        .ask(req.session_id, &req.question, req.snapshot_id)
        .await?;
    Ok(Json(reply))
}
