//! Workspace HTTP handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::workspace::{ActualState, CreateWorkspaceParams, DesiredState, Workspace};
use crate::{AppState, Result};

// ==================== Request/Response Types ====================

/// Create workspace request
#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    pub agent_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub processed_devfile: String,
    pub desired_state: Option<DesiredState>,
}

/// Workspace response
#[derive(Debug, Serialize)]
pub struct WorkspaceResponse {
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub agent_id: i64,
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub deployment_resource_version: Option<String>,
    pub dns_zone: String,
    pub created_at: String,
    pub updated_at: String,
}

/// List workspaces response
#[derive(Debug, Serialize)]
pub struct ListWorkspacesResponse {
    pub workspaces: Vec<WorkspaceResponse>,
    pub total: usize,
}

/// Update desired state request
#[derive(Debug, Deserialize)]
pub struct UpdateDesiredStateRequest {
    pub desired_state: DesiredState,
}

fn to_response(workspace: Workspace) -> WorkspaceResponse {
    WorkspaceResponse {
        id: workspace.id,
        name: workspace.name,
        namespace: workspace.namespace,
        agent_id: workspace.agent_id,
        desired_state: workspace.desired_state,
        actual_state: workspace.actual_state,
        deployment_resource_version: workspace.deployment_resource_version,
        dns_zone: workspace.dns_zone,
        created_at: workspace.created_at.to_rfc3339(),
        updated_at: workspace.updated_at.to_rfc3339(),
    }
}

// ==================== Handlers ====================

/// Create a new workspace
pub async fn create_workspace(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkspaceRequest>,
) -> Result<Json<WorkspaceResponse>> {
    let params = CreateWorkspaceParams {
        agent_id: req.agent_id,
        user_name: req.user_name,
        user_email: req.user_email,
        processed_devfile: req.processed_devfile,
        desired_state: req.desired_state,
    };

    let workspace = state.workspace_service.create(params).await?;
    Ok(Json(to_response(workspace)))
}

/// Get a workspace by ID
pub async fn get_workspace(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<WorkspaceResponse>> {
    let workspace = state.workspace_service.get(id).await?;
    Ok(Json(to_response(workspace)))
}

/// List all workspaces
pub async fn list_workspaces(State(state): State<AppState>) -> Result<Json<ListWorkspacesResponse>> {
    let workspaces = state.workspace_service.list().await?;
    let total = workspaces.len();

    Ok(Json(ListWorkspacesResponse {
        workspaces: workspaces.into_iter().map(to_response).collect(),
        total,
    }))
}

/// Move a workspace's desired state
pub async fn update_desired_state(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateDesiredStateRequest>,
) -> Result<Json<WorkspaceResponse>> {
    let workspace = state
        .workspace_service
        .update_desired_state(id, req.desired_state)
        .await?;
    Ok(Json(to_response(workspace)))
}
