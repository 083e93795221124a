//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{any, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::AppError;
use crate::server::handlers::{
    build_handler, deploy_handler, githook_handler, health_handler, index_handler,
    legacy_build_handler, legacy_deploy_handler, log_page_handler, service_handler,
    services_handler, version_handler, ws_handler,
};
use crate::server::state::ServerState;

/// Build the application router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Pages
        .route("/", get(index_handler))
        .route("/logs", get(log_page_handler))
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Services
        .route("/api/services", get(services_handler))
        .route("/api/services/{id}", get(service_handler))
        .route("/api/services/{id}/build", post(build_handler))
        .route("/api/services/{id}/deploy", post(deploy_handler))
        // Triggers kept for links and simple hooks
        .route("/build", get(legacy_build_handler))
        .route("/deploy", get(legacy_deploy_handler))
        .route("/githook", any(githook_handler))
        // Live logs
        .route("/ws", get(ws_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), AppError>>, AppError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| AppError::ServerError(e.to_string()))
    });

    Ok(handle)
}
