//! Workspace reconciliation pipeline
//!
//! One agent poll runs through this service: apply the agent's observations
//! to the persisted workspaces, select which workspaces need a response, and
//! build the per-workspace instruction payloads.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::agent::{Agent, AgentConfig};
use crate::domain::manifest::to_yaml_stream;
use crate::domain::types::{RailsInfo, ReconcileRequest, ReconcileResponse, WorkspaceAgentInfo};
use crate::domain::workspace::{ActualState, DesiredState, UpdateType, Workspace};
use crate::error::{Error, Result};
use crate::infra::sqlite::AgentRepository;
use crate::infra::workspace_repository::WorkspaceRepository;
use crate::service::desired_config::DesiredConfigGenerator;
use crate::service::observer;

/// Reconcile service driving one agent poll to completion
pub struct ReconcileService {
    workspaces: Arc<WorkspaceRepository>,
    agents: Arc<AgentRepository>,
    generator: Arc<DesiredConfigGenerator>,
}

impl ReconcileService {
    pub fn new(
        workspaces: Arc<WorkspaceRepository>,
        agents: Arc<AgentRepository>,
        generator: Arc<DesiredConfigGenerator>,
    ) -> Self {
        Self {
            workspaces,
            agents,
            generator,
        }
    }

    /// Run one reconciliation cycle for an agent.
    pub async fn process(&self, agent_id: i64, request: ReconcileRequest) -> Result<ReconcileResponse> {
        let agent = self.agents.get(agent_id).await?;
        let agent_config = self
            .agents
            .get_config(agent.id)
            .await?
            .filter(|config| config.enabled)
            .ok_or(Error::AgentNotEnabled(agent.id))?;

        debug!(
            agent_id = agent.id,
            update_type = ?request.update_type,
            count = request.workspace_agent_infos.len(),
            "Beginning reconcile cycle"
        );

        let matched_ids = self
            .apply_agent_infos(&agent, &request.workspace_agent_infos)
            .await?;

        let selected = self
            .select_workspaces(agent.id, request.update_type, &matched_ids)
            .await?;

        let mut rails_infos = Vec::with_capacity(selected.len());
        let mut responded = Vec::with_capacity(selected.len());
        for workspace in &selected {
            let config_to_apply =
                self.config_to_apply(workspace, &agent_config, request.update_type)?;
            rails_infos.push(RailsInfo {
                name: workspace.name.clone(),
                namespace: workspace.namespace.clone(),
                desired_state: workspace.desired_state,
                actual_state: workspace.actual_state,
                deployment_resource_version: workspace.deployment_resource_version.clone(),
                config_to_apply,
            });
            responded.push((workspace.id, workspace.desired_state_version));
        }

        // Acknowledge after all state calculations are done, in one pass.
        self.workspaces.mark_responded(&responded).await?;

        observer::observe_rails_infos(agent.id, request.update_type, &rails_infos);

        Ok(ReconcileResponse {
            workspace_rails_infos: rails_infos,
        })
    }

    /// Apply a batch of agent observations to the persisted workspaces.
    ///
    /// Returns the ids of the workspaces the batch matched. Failures are
    /// isolated per item; desired state is never written here.
    async fn apply_agent_infos(&self, agent: &Agent, infos: &[WorkspaceAgentInfo]) -> Result<Vec<i64>> {
        let mut matched_ids = Vec::new();
        let mut orphaned: Vec<(String, String)> = Vec::new();
        let mut failures = 0usize;

        for info in infos {
            let reported_state = info.actual_state();

            if reported_state.is_abnormal() {
                warn!(
                    error_type = "abnormal_workspace_state",
                    workspace_name = %info.name,
                    workspace_namespace = %info.namespace,
                    actual_state = reported_state.as_str(),
                    previous_actual_state = ?info.previous_actual_state.map(|s| s.as_str()),
                    "Abnormal workspace actual state reported"
                );
            }

            let workspace = match self
                .workspaces
                .find_by_agent_name_namespace(agent.id, &info.name, &info.namespace)
                .await
            {
                Ok(Some(workspace)) => workspace,
                Ok(None) => {
                    orphaned.push((info.name.clone(), info.namespace.clone()));
                    continue;
                }
                Err(err) => {
                    failures += 1;
                    warn!(
                        workspace_name = %info.name,
                        workspace_namespace = %info.namespace,
                        error = %err,
                        "Failed to look up workspace for agent info"
                    );
                    continue;
                }
            };

            matched_ids.push(workspace.id);

            // Terminated is terminal: no report can move the workspace out of it.
            if workspace.actual_state == ActualState::Terminated {
                continue;
            }

            // The agent no longer seeing the resources of a workspace the user
            // wants gone is the confirmation of a successful teardown.
            let new_actual_state =
                if !info.workspace_exists && workspace.desired_state == DesiredState::Terminated {
                    ActualState::Terminated
                } else {
                    reported_state
                };

            if let Err(err) = self
                .workspaces
                .update_agent_reported_state(
                    workspace.id,
                    new_actual_state,
                    info.deployment_resource_version.as_deref(),
                )
                .await
            {
                failures += 1;
                warn!(
                    workspace_id = workspace.id,
                    workspace_name = %workspace.name,
                    error = %err,
                    "Failed to persist agent-reported workspace state"
                );
            }
        }

        if !orphaned.is_empty() {
            debug!(
                error_type = "orphaned_workspace",
                agent_id = agent.id,
                count = orphaned.len(),
                workspaces = ?orphaned,
                "Received agent info for workspaces with no persisted record"
            );
        }
        if failures > 0 {
            warn!(
                agent_id = agent.id,
                failures,
                total = infos.len(),
                "Some workspace agent infos could not be applied"
            );
        }

        Ok(matched_ids)
    }

    /// Pick the workspaces to include in the response.
    ///
    /// A full update returns every workspace that has not fully terminated; a
    /// partial update returns the ones with unacknowledged desired-state
    /// changes plus acknowledgment rows for whatever the batch reported.
    async fn select_workspaces(
        &self,
        agent_id: i64,
        update_type: UpdateType,
        matched_ids: &[i64],
    ) -> Result<Vec<Workspace>> {
        match update_type {
            UpdateType::Full => self.workspaces.list_active_for_agent(agent_id).await,
            UpdateType::Partial => {
                let mut selected = self.workspaces.list_needing_resync_for_agent(agent_id).await?;
                for id in matched_ids {
                    if selected.iter().any(|workspace| workspace.id == *id) {
                        continue;
                    }
                    let workspace = self.workspaces.get(*id).await?;
                    if !workspace.fully_terminated() {
                        selected.push(workspace);
                    }
                }
                selected.sort_by_key(|workspace| workspace.id);
                Ok(selected)
            }
        }
    }

    /// Compute the serialized desired config for one rails info.
    ///
    /// A full update always re-asserts the complete desired state; a partial
    /// update only ships config to workspaces with unacknowledged changes.
    fn config_to_apply(
        &self,
        workspace: &Workspace,
        agent_config: &AgentConfig,
        update_type: UpdateType,
    ) -> Result<Option<String>> {
        if update_type == UpdateType::Partial && !workspace.needs_resync() {
            return Ok(None);
        }

        let manifests = self.generator.generate(workspace, agent_config)?;
        let stream = to_yaml_stream(&manifests)
            .map_err(|e| Error::Internal(format!("Failed to serialize desired config: {}", e)))?;
        Ok(Some(stream))
    }
}
