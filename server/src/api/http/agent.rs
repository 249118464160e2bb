//! Agent HTTP handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::agent::{AgentConfig, RemoteDevelopmentSettings};
use crate::infra::license::Feature;
use crate::service::agent_config::{AgentConfigUpdateOutcome, SkippedReason};
use crate::{AppState, Error, Result};

// ==================== Request/Response Types ====================

/// Register agent request
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub name: String,
}

/// Agent response
#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: i64,
    pub name: String,
    pub created_at: String,
}

/// Agent config file contents, as reported by the agent.
///
/// Only the `remote_development` section matters here; a file without one is
/// a no-op, not an error.
#[derive(Debug, Deserialize)]
pub struct AgentConfigFileRequest {
    #[serde(default)]
    pub remote_development: Option<RemoteDevelopmentSettings>,
}

/// Agent config response
#[derive(Debug, Serialize)]
pub struct AgentConfigResponse {
    pub id: i64,
    pub agent_id: i64,
    pub enabled: bool,
    pub dns_zone: String,
    pub network_policy_enabled: bool,
    pub gitlab_workspaces_proxy_namespace: String,
}

impl From<AgentConfig> for AgentConfigResponse {
    fn from(config: AgentConfig) -> Self {
        Self {
            id: config.id,
            agent_id: config.agent_id,
            enabled: config.enabled,
            dns_zone: config.dns_zone,
            network_policy_enabled: config.network_policy_enabled,
            gitlab_workspaces_proxy_namespace: config.gitlab_workspaces_proxy_namespace,
        }
    }
}

/// Outcome of a configuration update
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AgentConfigUpdateResponse {
    Updated { agent_config: AgentConfigResponse },
    Skipped { reason: SkippedReason },
}

// ==================== Handlers ====================

/// Register a new agent
pub async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<Json<AgentResponse>> {
    let agent = state.agents.create(&req.name).await?;

    Ok(Json(AgentResponse {
        id: agent.id,
        name: agent.name,
        created_at: agent.created_at.to_rfc3339(),
    }))
}

/// Apply an agent's reported config file
pub async fn update_configuration(
    State(state): State<AppState>,
    Path(agent_id): Path<i64>,
    Json(req): Json<AgentConfigFileRequest>,
) -> Result<Json<AgentConfigUpdateResponse>> {
    if !state.license.feature_available(Feature::RemoteDevelopment) {
        return Err(Error::Unlicensed);
    }

    let outcome = state
        .agent_config_updater
        .update(agent_id, req.remote_development)
        .await?;

    let response = match outcome {
        AgentConfigUpdateOutcome::Updated(config) => AgentConfigUpdateResponse::Updated {
            agent_config: config.into(),
        },
        AgentConfigUpdateOutcome::Skipped(reason) => AgentConfigUpdateResponse::Skipped { reason },
    };

    Ok(Json(response))
}
