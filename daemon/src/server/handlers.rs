//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::service::{Phase, RunKey, ServiceStatus};
use crate::server::state::ServerState;
use crate::server::viewer;
use crate::utils::version_info;

const INDEX_PAGE: &str = include_str!("../../web/index.html");
const LOG_PAGE: &str = include_str!("../../web/log.html");

fn status_code(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "buildcast".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Dashboard page
pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Log viewer page; the page itself reads `id` and `typ` from its URL
pub async fn log_page_handler() -> Html<&'static str> {
    Html(LOG_PAGE)
}

/// All services with their status
pub async fn services_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<ServiceStatus>> {
    Json(state.pipeline.statuses())
}

/// One service with its status
pub async fn service_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<ServiceStatus>, StatusCode> {
    state
        .pipeline
        .status(&id)
        .map(Json)
        .map_err(|e| status_code(&e))
}

/// Trigger response
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    /// `false` when the phase was already running
    pub accepted: bool,
}

/// Start a build
pub async fn build_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<TriggerResponse>, StatusCode> {
    trigger(&state, &id, Phase::Build)
}

/// Start a deploy
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<TriggerResponse>, StatusCode> {
    trigger(&state, &id, Phase::Deploy)
}

fn trigger(state: &ServerState, id: &str, phase: Phase) -> Result<Json<TriggerResponse>, StatusCode> {
    let accepted = state
        .pipeline
        .start(id, phase)
        .map_err(|e| status_code(&e))?;
    Ok(Json(TriggerResponse { accepted }))
}

/// Service selector used by the form-style endpoints
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    pub id: Option<String>,
}

/// Start a build and go back to the dashboard
pub async fn legacy_build_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Redirect {
    legacy_trigger(&state, query, Phase::Build)
}

/// Start a deploy and go back to the dashboard
pub async fn legacy_deploy_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
) -> Redirect {
    legacy_trigger(&state, query, Phase::Deploy)
}

fn legacy_trigger(state: &ServerState, query: IdQuery, phase: Phase) -> Redirect {
    if let Some(id) = query.id {
        if let Err(e) = state.pipeline.start(&id, phase) {
            debug!("Ignoring {} trigger: {}", phase, e);
        }
    }
    Redirect::to("/")
}

/// Webhook endpoint; starts a build when `id` names a service
pub async fn githook_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<IdQuery>,
    body: Bytes,
) -> &'static str {
    debug!(bytes = body.len(), "Webhook payload: {}", String::from_utf8_lossy(&body));

    if let Some(id) = query.id {
        match state.pipeline.start_build(&id) {
            Ok(true) => info!(service = %id, "Build started by webhook"),
            Ok(false) => debug!(service = %id, "Webhook build dropped, already building"),
            Err(e) => warn!(service = %id, "Webhook ignored: {}", e),
        }
    }
    "ok"
}

/// Log stream selector
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub id: String,
    pub typ: String,
}

/// Live log stream over a WebSocket
pub async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<LogQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let phase: Phase = query.typ.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    let service = state.pipeline.service(&query.id).map_err(|e| status_code(&e))?;
    let key = RunKey::new(&service.id, phase);
    let hub = state.hub.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        let (sink, source) = viewer::split(socket);
        if let Err(e) = hub.attach(key, sink, source).await {
            warn!("Viewer failed: {}", e);
        }
    }))
}
