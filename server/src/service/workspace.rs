//! Workspace lifecycle commands
//!
//! The user-authoritative side of the state model: creating workspaces and
//! moving their desired state. Actual state is never written here.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::workspace::{ActualState, CreateWorkspaceParams, DesiredState, Workspace};
use crate::error::{Error, Result};
use crate::infra::sqlite::AgentRepository;
use crate::infra::workspace_repository::{NewWorkspace, WorkspaceRepository};

/// Workspace service for user-driven lifecycle operations
pub struct WorkspaceService {
    workspaces: Arc<WorkspaceRepository>,
    agents: Arc<AgentRepository>,
}

impl WorkspaceService {
    pub fn new(workspaces: Arc<WorkspaceRepository>, agents: Arc<AgentRepository>) -> Self {
        Self { workspaces, agents }
    }

    /// Create a new workspace on an agent with remote development enabled.
    ///
    /// The agent config's DNS zone is snapshotted onto the workspace record;
    /// later config changes do not retroactively move existing hostnames.
    pub async fn create(&self, params: CreateWorkspaceParams) -> Result<Workspace> {
        let agent = self.agents.get(params.agent_id).await?;
        let config = self
            .agents
            .get_config(agent.id)
            .await?
            .filter(|config| config.enabled)
            .ok_or(Error::AgentNotEnabled(agent.id))?;

        if serde_yaml::from_str::<serde_yaml::Value>(&params.processed_devfile).is_err() {
            return Err(Error::validation("processed_devfile", "must be valid YAML"));
        }

        let suffix = random_suffix();
        let workspace = self
            .workspaces
            .insert(NewWorkspace {
                name: format!("workspace-{}-{}", agent.id, suffix),
                namespace: format!("workspace-ns-{}-{}", agent.id, suffix),
                agent_id: agent.id,
                user_name: params.user_name,
                user_email: params.user_email,
                desired_state: params.desired_state.unwrap_or(DesiredState::Running),
                actual_state: ActualState::CreationRequested,
                processed_devfile: params.processed_devfile,
                dns_zone: config.dns_zone,
            })
            .await?;

        info!(
            workspace_id = workspace.id,
            workspace_name = %workspace.name,
            agent_id = agent.id,
            "Workspace created"
        );
        Ok(workspace)
    }

    /// Get a workspace by ID
    pub async fn get(&self, id: i64) -> Result<Workspace> {
        self.workspaces.get(id).await
    }

    /// List all workspaces
    pub async fn list(&self) -> Result<Vec<Workspace>> {
        self.workspaces.list().await
    }

    /// Move a workspace's desired state.
    ///
    /// `Terminated` is final: once requested it can never be left again.
    pub async fn update_desired_state(&self, id: i64, desired_state: DesiredState) -> Result<Workspace> {
        let workspace = self.workspaces.get(id).await?;

        if workspace.desired_state == DesiredState::Terminated {
            return Err(Error::validation(
                "desired_state",
                "cannot be changed after termination has been requested",
            ));
        }
        if workspace.desired_state == desired_state {
            return Ok(workspace);
        }

        let updated = self.workspaces.update_desired_state(id, desired_state).await?;
        info!(
            workspace_id = id,
            desired_state = updated.desired_state.as_str(),
            "Workspace desired state updated"
        );
        Ok(updated)
    }
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
