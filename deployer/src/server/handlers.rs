//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::containers::inventory::ActionOutcome;
use crate::models::app::{AppInfo, ContainerAction};
use crate::models::deployment::{is_safe_name, DeployRequest, DEFAULT_BRANCH};
use crate::models::history::HistoryEvent;
use crate::models::settings::{AppSettings, AppSettingsPatch};
use crate::server::errors::ApiError;
use crate::server::state::ServerState;
use crate::storage::history::HistoryQuery;
use crate::utils::{env_to_text, iso_timestamp, version_info, VersionInfo};

/// Framework assumed when redeploying an app that never stored one
const DEFAULT_FRAMEWORK: &str = "vite";

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub timestamp: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        ok: true,
        timestamp: iso_timestamp(Utc::now()),
        version: version_info().version,
    })
}

/// Version handler
pub async fn version_handler() -> Json<VersionInfo> {
    Json(version_info())
}

/// Managed apps response
#[derive(Debug, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<AppInfo>,
}

/// Managed apps handler
pub async fn apps_handler(State(state): State<Arc<ServerState>>) -> Json<AppsResponse> {
    Json(AppsResponse {
        apps: state.inventory.list().await,
    })
}

/// Deploy handler. Streams the session log as plain text; closing the
/// connection cancels the session.
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let stream = state.orchestrator.start(request)?;

    let body = Body::from_stream(stream.into_stream().map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        body,
    )
        .into_response())
}

/// Container action request
#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub purge: bool,
}

/// Container action response
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<AppInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purged: Option<bool>,
}

/// Container action handler
pub async fn container_action_handler(
    State(state): State<Arc<ServerState>>,
    Path(container): Path<String>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let raw_action = request.action.unwrap_or_default();
    let action = ContainerAction::parse(&raw_action)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown action {}", raw_action)))?;

    let response = match state.inventory.act(&container, action, request.purge).await? {
        ActionOutcome::Updated(app) => ActionResponse {
            ok: true,
            app: Some(app),
            removed: None,
            purged: None,
        },
        ActionOutcome::Removed { purged } => ActionResponse {
            ok: true,
            app: None,
            removed: Some(true),
            purged: Some(purged),
        },
    };
    Ok(Json(response))
}

/// History query parameters
#[derive(Debug, Default, Deserialize)]
pub struct DeploymentsParams {
    pub app: Option<String>,
    pub limit: Option<String>,
}

/// History response
#[derive(Debug, Serialize)]
pub struct DeploymentsResponse {
    pub deployments: Vec<HistoryEvent>,
}

/// History handler. A `limit` that is not a positive integer is ignored.
pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<DeploymentsParams>,
) -> Result<Json<DeploymentsResponse>, ApiError> {
    let query = HistoryQuery {
        app: params.app.map(|a| a.trim().to_string()).filter(|a| !a.is_empty()),
        limit: params
            .limit
            .as_deref()
            .and_then(|l| l.trim().parse::<usize>().ok())
            .filter(|l| *l > 0),
    };
    let deployments = state.history.list(&query).await?;
    Ok(Json(DeploymentsResponse { deployments }))
}

/// Settings response
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub settings: AppSettings,
}

fn checked_app_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if !is_safe_name(name) {
        return Err(ApiError::bad_request(format!("Invalid app name {:?}.", name)));
    }
    Ok(name)
}

/// Get settings handler
pub async fn get_settings_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let name = checked_app_name(&name)?;
    let settings = state
        .settings
        .get(name)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No settings stored for {}.", name)))?;
    Ok(Json(SettingsResponse { settings }))
}

/// Update settings handler
pub async fn put_settings_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    payload: Result<Json<AppSettingsPatch>, JsonRejection>,
) -> Result<Json<SettingsResponse>, ApiError> {
    let name = checked_app_name(&name)?;
    let Json(patch) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let settings = state.settings.upsert(name, patch).await?;
    Ok(Json(SettingsResponse { settings }))
}

/// Plain acknowledgement
#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Delete settings handler
pub async fn delete_settings_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    let name = checked_app_name(&name)?;
    state.settings.delete(name).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// Stored configuration for a redeploy
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub name: String,
    pub repo_url: String,
    pub app_path: Option<String>,
    pub variables: String,
    pub framework: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub branch: String,
}

/// Deploy config response
#[derive(Debug, Serialize)]
pub struct DeployConfigResponse {
    pub config: DeployConfig,
}

/// Deploy config handler
pub async fn deploy_config_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
) -> Result<Json<DeployConfigResponse>, ApiError> {
    let name = checked_app_name(&name)?;
    let settings = state.settings.get(name).await?;
    let Some((settings, repo_url)) =
        settings.and_then(|s| s.repo_url.clone().map(|repo_url| (s, repo_url)))
    else {
        return Err(ApiError::not_found(format!(
            "No deploy configuration stored for {}.",
            name
        )));
    };

    let config = DeployConfig {
        name: name.to_string(),
        repo_url,
        app_path: settings.app_path,
        variables: settings
            .public_env
            .as_ref()
            .map(env_to_text)
            .unwrap_or_default(),
        framework: settings
            .framework
            .unwrap_or_else(|| DEFAULT_FRAMEWORK.to_string()),
        domain: settings.domain,
        branch: settings
            .branch
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
    };
    Ok(Json(DeployConfigResponse { config }))
}

/// Fallback for unknown routes
pub async fn not_found_handler() -> ApiError {
    ApiError::not_found("Not found")
}
