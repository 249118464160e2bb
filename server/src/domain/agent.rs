//! Cluster agent domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace the workspaces proxy runs in unless the agent config overrides it.
pub const DEFAULT_PROXY_NAMESPACE: &str = "gitlab-workspaces";

/// Agent entity
///
/// A process running inside a Kubernetes cluster that polls this server for
/// reconciliation instructions. Only the slice of the agent needed for
/// reconciliation is modeled here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier
    pub id: i64,

    /// Agent name, unique per installation
    pub name: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Per-agent remote development configuration
///
/// One-to-one with an agent, created or updated only when the agent reports
/// its config file. `enabled` can never transition back to false once true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique identifier
    pub id: i64,

    /// Owning agent
    pub agent_id: i64,

    /// Whether remote development workspaces may be scheduled on this agent
    pub enabled: bool,

    /// DNS zone used for generated workspace hostnames
    pub dns_zone: String,

    /// Whether generated configs include a NetworkPolicy
    pub network_policy_enabled: bool,

    /// Namespace of the workspaces proxy the NetworkPolicy admits traffic from
    pub gitlab_workspaces_proxy_namespace: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// The `remote_development` section of an agent's config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteDevelopmentSettings {
    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub dns_zone: Option<String>,

    #[serde(default)]
    pub network_policy: Option<NetworkPolicySettings>,

    #[serde(default)]
    pub gitlab_workspaces_proxy_namespace: Option<String>,
}

/// The `network_policy` subsection of the remote development settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkPolicySettings {
    #[serde(default = "default_network_policy_enabled")]
    pub enabled: bool,
}

fn default_network_policy_enabled() -> bool {
    true
}
