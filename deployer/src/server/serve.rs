//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::DeployerError;
use crate::server::handlers::{
    apps_handler, container_action_handler, delete_settings_handler, deploy_config_handler,
    deploy_handler, deployments_handler, get_settings_handler, health_handler, not_found_handler,
    put_settings_handler, version_handler,
};
use crate::server::state::ServerState;

/// Build the API router
pub fn router(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        // Apps
        .route("/apps", get(apps_handler))
        .route(
            "/apps/{name}/settings",
            get(get_settings_handler)
                .put(put_settings_handler)
                .delete(delete_settings_handler),
        )
        .route("/apps/{name}/deploy-config", get(deploy_config_handler))
        // Deploys
        .route("/deploy", post(deploy_handler))
        .route("/deployments", get(deployments_handler))
        // Containers
        .route("/containers/{container}/action", post(container_action_handler))
        .route("/version", get(version_handler));

    Router::new()
        .route("/healthz", get(health_handler))
        .nest("/api", api)
        .fallback(not_found_handler)
        // State and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DeployerError>>, DeployerError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DeployerError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DeployerError::ServerError(e.to_string()))
    });

    Ok(handle)
}
