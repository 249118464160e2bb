//! Agent configuration updates
//!
//! Applies the `remote_development` section of an agent's reported config
//! file to the one config record the agent owns.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::domain::agent::{AgentConfig, RemoteDevelopmentSettings, DEFAULT_PROXY_NAMESPACE};
use crate::error::{Error, FieldError, Result};
use crate::infra::sqlite::{AgentConfigUpdate, AgentRepository};

/// Why an update call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkippedReason {
    NoConfigFileEntryFound,
}

/// Result of applying an agent's config file.
#[derive(Debug)]
pub enum AgentConfigUpdateOutcome {
    Updated(AgentConfig),
    /// The config file had no remote development section. This is the common
    /// case and not an error.
    Skipped(SkippedReason),
}

/// Applies reported agent config files.
pub struct AgentConfigUpdater {
    agents: Arc<AgentRepository>,
}

impl AgentConfigUpdater {
    pub fn new(agents: Arc<AgentRepository>) -> Self {
        Self { agents }
    }

    /// Validate and persist the reported settings for an agent.
    ///
    /// Validation failures leave the existing record untouched.
    pub async fn update(
        &self,
        agent_id: i64,
        settings: Option<RemoteDevelopmentSettings>,
    ) -> Result<AgentConfigUpdateOutcome> {
        let agent = self.agents.get(agent_id).await?;

        let Some(settings) = settings else {
            return Ok(AgentConfigUpdateOutcome::Skipped(
                SkippedReason::NoConfigFileEntryFound,
            ));
        };

        let existing = self.agents.get_config(agent.id).await?;

        let enabled = settings.enabled.unwrap_or(false);
        let dns_zone = settings.dns_zone.unwrap_or_default();
        let network_policy_enabled = settings.network_policy.map_or(true, |np| np.enabled);
        let gitlab_workspaces_proxy_namespace = settings
            .gitlab_workspaces_proxy_namespace
            .unwrap_or_else(|| DEFAULT_PROXY_NAMESPACE.to_string());

        let mut errors = Vec::new();
        if dns_zone.is_empty() {
            errors.push(FieldError::new("dns_zone", "can't be blank"));
        } else if !valid_dns_zone(&dns_zone) {
            errors.push(FieldError::new(
                "dns_zone",
                "must be dot-separated labels of lowercase alphanumerics and hyphens",
            ));
        }
        if !valid_label(&gitlab_workspaces_proxy_namespace) {
            errors.push(FieldError::new(
                "gitlab_workspaces_proxy_namespace",
                "must be a valid namespace name",
            ));
        }
        if let Some(existing) = &existing {
            if existing.enabled && !enabled {
                errors.push(FieldError::new(
                    "enabled",
                    "cannot be disabled after it has been enabled",
                ));
            }
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let config = self
            .agents
            .save_config(
                agent.id,
                AgentConfigUpdate {
                    enabled,
                    dns_zone,
                    network_policy_enabled,
                    gitlab_workspaces_proxy_namespace,
                },
            )
            .await?;

        info!(agent_id = agent.id, enabled = config.enabled, "Agent config updated");
        Ok(AgentConfigUpdateOutcome::Updated(config))
    }
}

fn valid_dns_zone(zone: &str) -> bool {
    !zone.is_empty() && zone.split('.').all(valid_label)
}

fn valid_label(label: &str) -> bool {
    !label.is_empty()
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
