//! HTTP request handlers

use std::sync::Arc;

use api_models::{
    CreateDeploymentRequest, CreateDeploymentResponse, DeleteDeploymentResponse,
    DeploymentResponse, DeploymentStatusResponse, LogLine, LogsQuery, LogsResponse,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::errors::PlatformError;
use crate::models::{Deployment, DeploymentId, DeploymentLogRecord, LogPage, ProjectId};
use crate::server::state::ServerState;
use crate::utils::version_info;

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
        service: "shipyard".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

fn deployment_response(deployment: Deployment) -> DeploymentResponse {
    DeploymentResponse {
        id: deployment.id.to_string(),
        project_id: deployment.project_id.to_string(),
        status: deployment.status.to_string(),
        ready_url: deployment.ready_url,
        duration_secs: deployment.duration_secs,
        last_log_id: deployment.last_log_id,
        created_at: deployment.created_at,
        updated_at: deployment.updated_at,
    }
}

fn log_line(record: DeploymentLogRecord) -> LogLine {
    LogLine {
        id: record.id,
        message: record.message,
        stack: record.stack,
        log_type: record.log_type.to_string(),
        timestamp: record.timestamp,
    }
}

/// Create a deployment and start its build
pub async fn create_deployment_handler(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<CreateDeploymentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, PlatformError> {
    let Json(body) = body.map_err(|e| PlatformError::Validation(e.body_text()))?;
    if body.project_id.trim().is_empty() {
        return Err(PlatformError::Validation("projectId is required".to_string()));
    }

    let deployment = state
        .launcher
        .create_deployment(&ProjectId::new(body.project_id))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateDeploymentResponse {
            deployment_id: deployment.id.to_string(),
            status: deployment.status.to_string(),
        }),
    ))
}

/// Get one deployment
pub async fn get_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentResponse>, PlatformError> {
    let deployment = state.launcher.get_deployment(&DeploymentId::new(id)).await?;
    Ok(Json(deployment_response(deployment)))
}

pub async fn deployment_status_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeploymentStatusResponse>, PlatformError> {
    let deployment = state.launcher.get_deployment(&DeploymentId::new(id)).await?;
    Ok(Json(DeploymentStatusResponse {
        deployment_id: deployment.id.to_string(),
        status: deployment.status.to_string(),
        ready_url: deployment.ready_url,
    }))
}

/// Delete a finished deployment and its artifacts
pub async fn delete_deployment_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteDeploymentResponse>, PlatformError> {
    let id = DeploymentId::new(id);
    let removed_artifacts = state.launcher.delete_deployment(&id).await?;
    Ok(Json(DeleteDeploymentResponse {
        deployment_id: id.to_string(),
        removed_artifacts,
    }))
}

/// Page through a deployment's build log
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>, PlatformError> {
    let default = LogPage::default();
    let page = LogPage::new(
        query.page.unwrap_or(default.page),
        query.per_page.unwrap_or(default.per_page),
    );

    let id = DeploymentId::new(id);
    let logs = state.launcher.list_logs(&id, page).await?;

    Ok(Json(LogsResponse {
        deployment_id: id.to_string(),
        page: page.page,
        per_page: page.per_page,
        logs: logs.into_iter().map(log_line).collect(),
    }))
}
