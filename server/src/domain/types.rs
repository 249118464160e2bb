//! Transient reconciliation payload types
//!
//! These are plain value types that live for one reconcile request; they have
//! no persistence identity.

use serde::{Deserialize, Serialize};

use crate::domain::actual_state::{calculate_actual_state, K8sDeploymentInfo, TerminationProgress};
use crate::domain::workspace::{ActualState, DesiredState, UpdateType};

/// One agent-reported workspace observation.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceAgentInfo {
    pub name: String,
    pub namespace: String,

    #[serde(default)]
    pub deployment_resource_version: Option<String>,

    /// Actual state immediately prior to the current one, as seen by the agent
    #[serde(default)]
    pub previous_actual_state: Option<ActualState>,

    /// Explicitly reported actual state; when absent it is derived from the
    /// deployment snapshot and termination progress below
    #[serde(default)]
    pub current_actual_state: Option<ActualState>,

    /// Whether the agent still sees the workspace's resources in the cluster
    pub workspace_exists: bool,

    #[serde(default)]
    pub termination_progress: Option<TerminationProgress>,

    #[serde(default)]
    pub latest_k8s_deployment_info: Option<K8sDeploymentInfo>,
}

impl WorkspaceAgentInfo {
    /// The actual state this observation amounts to.
    pub fn actual_state(&self) -> ActualState {
        self.current_actual_state.unwrap_or_else(|| {
            calculate_actual_state(
                self.latest_k8s_deployment_info.as_ref(),
                self.termination_progress,
            )
        })
    }
}

/// Per-workspace instruction payload returned to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RailsInfo {
    pub name: String,
    pub namespace: String,
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub deployment_resource_version: Option<String>,
    /// Multi-document YAML stream of the desired config; `null` when the
    /// agent already holds the correct manifests
    pub config_to_apply: Option<String>,
}

/// Inbound reconcile request body.
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub update_type: UpdateType,
    #[serde(default)]
    pub workspace_agent_infos: Vec<WorkspaceAgentInfo>,
}

/// Outbound reconcile response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub workspace_rails_infos: Vec<RailsInfo>,
}
