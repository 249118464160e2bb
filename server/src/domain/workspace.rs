//! Workspace domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User-intended lifecycle state of a workspace.
///
/// Mutated only through explicit user commands, never inferred from what the
/// agent reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DesiredState {
    Running,
    Stopped,
    Terminated,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredState::Running => "Running",
            DesiredState::Stopped => "Stopped",
            DesiredState::Terminated => "Terminated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(DesiredState::Running),
            "Stopped" => Some(DesiredState::Stopped),
            "Terminated" => Some(DesiredState::Terminated),
            _ => None,
        }
    }
}

/// Cluster-observed lifecycle state of a workspace, reported by the agent.
///
/// Written exclusively from agent reports; the desired state axis is never
/// derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActualState {
    CreationRequested,
    Starting,
    Running,
    Stopping,
    Stopped,
    Terminating,
    Terminated,
    Failed,
    Error,
    Unknown,
}

impl ActualState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualState::CreationRequested => "CreationRequested",
            ActualState::Starting => "Starting",
            ActualState::Running => "Running",
            ActualState::Stopping => "Stopping",
            ActualState::Stopped => "Stopped",
            ActualState::Terminating => "Terminating",
            ActualState::Terminated => "Terminated",
            ActualState::Failed => "Failed",
            ActualState::Error => "Error",
            ActualState::Unknown => "Unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CreationRequested" => Some(ActualState::CreationRequested),
            "Starting" => Some(ActualState::Starting),
            "Running" => Some(ActualState::Running),
            "Stopping" => Some(ActualState::Stopping),
            "Stopped" => Some(ActualState::Stopped),
            "Terminating" => Some(ActualState::Terminating),
            "Terminated" => Some(ActualState::Terminated),
            "Failed" => Some(ActualState::Failed),
            "Error" => Some(ActualState::Error),
            "Unknown" => Some(ActualState::Unknown),
            _ => None,
        }
    }

    /// States that indicate something went wrong in the cluster and deserve a
    /// louder log entry when reported.
    pub fn is_abnormal(&self) -> bool {
        matches!(self, ActualState::Unknown | ActualState::Error)
    }
}

/// Scope of a reconciliation cycle requested by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    /// Re-assert complete desired state for every relevant workspace.
    Full,
    /// Only workspaces with unacknowledged desired-state changes.
    Partial,
}

/// Workspace entity
///
/// A cloud development environment running on the cluster managed by one
/// agent. The desired state axis is driven by the user; the actual state axis
/// is driven by agent reports. Reconciliation compares the two.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique identifier
    pub id: i64,

    /// Kubernetes resource name prefix, stable for the workspace's lifetime
    pub name: String,

    /// Kubernetes namespace the workspace lives in
    pub namespace: String,

    /// Owning cluster agent
    pub agent_id: i64,

    /// Owner identity, injected into generated git configuration
    pub user_name: String,
    pub user_email: String,

    /// User-intended lifecycle state
    pub desired_state: DesiredState,

    /// Agent-reported lifecycle state
    pub actual_state: ActualState,

    /// Last-known Deployment resourceVersion reported by the agent
    pub deployment_resource_version: Option<String>,

    /// Incremented on every desired-state mutation
    pub desired_state_version: i64,

    /// The desired-state version most recently included in a response to the agent
    pub responded_to_agent_version: i64,

    /// Wall-clock twins of the version counters, kept for observability only
    pub desired_state_updated_at: DateTime<Utc>,
    pub responded_to_agent_at: Option<DateTime<Utc>>,

    /// Fully-resolved devfile content, immutable after creation
    pub processed_devfile: String,

    /// DNS zone snapshot taken from the agent config at creation time
    pub dns_zone: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// Whether the workspace should currently be running in the cluster.
    pub fn desired_state_running(&self) -> bool {
        self.desired_state == DesiredState::Running
    }

    /// Both axes have reached `Terminated`: the workspace is permanently
    /// excluded from reconciliation.
    pub fn fully_terminated(&self) -> bool {
        self.desired_state == DesiredState::Terminated && self.actual_state == ActualState::Terminated
    }

    /// The desired state changed after the last response sent to the agent.
    pub fn needs_resync(&self) -> bool {
        self.desired_state_version > self.responded_to_agent_version
    }

    /// Name of the inventory object that owns all generated resources.
    pub fn inventory_name(&self) -> String {
        format!("{}-workspace-inventory", self.name)
    }

    /// Host template for ingress hosts, with a `{port}` placeholder.
    pub fn host_template(&self) -> String {
        format!("{{port}}-{}.{}", self.name, self.dns_zone)
    }
}

/// Parameters for creating a workspace
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkspaceParams {
    /// Agent that will run the workspace
    pub agent_id: i64,

    /// Owner identity
    pub user_name: String,
    pub user_email: String,

    /// Fully-resolved devfile content
    pub processed_devfile: String,

    /// Initial desired state, defaults to Running
    pub desired_state: Option<DesiredState>,
}
