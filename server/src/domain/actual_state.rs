//! Actual-state derivation from agent-reported Kubernetes evidence
//!
//! When an agent does not state a workspace's actual state explicitly, it is
//! derived from the termination progress marker and the latest observed
//! Deployment spec/status, following the standard Deployment condition
//! semantics (Progressing/Available condition reasons plus replica counts).

use serde::Deserialize;

use crate::domain::workspace::ActualState;

const CONDITION_TYPE_PROGRESSING: &str = "Progressing";
const CONDITION_TYPE_AVAILABLE: &str = "Available";

const PROGRESSING_REASONS_IN_PROGRESS: [&str; 3] = [
    "NewReplicaSetCreated",
    "FoundNewReplicaSet",
    "ReplicaSetUpdated",
];
const PROGRESSING_REASON_COMPLETE: &str = "NewReplicaSetAvailable";
const PROGRESSING_REASON_FAILED: &str = "ProgressDeadlineExceeded";

const AVAILABLE_REASON_MINIMUM_REPLICAS_AVAILABLE: &str = "MinimumReplicasAvailable";
const AVAILABLE_REASON_MINIMUM_REPLICAS_UNAVAILABLE: &str = "MinimumReplicasUnavailable";

/// Teardown progress reported by the agent while it deletes workspace resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TerminationProgress {
    Terminating,
    Terminated,
}

/// Subset of a Kubernetes Deployment included in agent observations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct K8sDeploymentInfo {
    #[serde(default)]
    pub spec: Option<DeploymentInfoSpec>,
    #[serde(default)]
    pub status: Option<DeploymentInfoStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeploymentInfoSpec {
    #[serde(default)]
    pub replicas: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfoStatus {
    #[serde(default)]
    pub conditions: Option<Vec<DeploymentCondition>>,
    #[serde(default)]
    pub available_replicas: Option<i32>,
    #[serde(default)]
    pub unavailable_replicas: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Derive an [`ActualState`] from agent-reported evidence.
///
/// Anything incomplete or unrecognized maps to `Unknown` rather than failing:
/// an observation the server cannot interpret is not a request error.
pub fn calculate_actual_state(
    deployment_info: Option<&K8sDeploymentInfo>,
    termination_progress: Option<TerminationProgress>,
) -> ActualState {
    match termination_progress {
        Some(TerminationProgress::Terminating) => return ActualState::Terminating,
        Some(TerminationProgress::Terminated) => return ActualState::Terminated,
        None => {}
    }

    let Some(info) = deployment_info else {
        return ActualState::Unknown;
    };
    let (Some(spec), Some(status)) = (info.spec.as_ref(), info.status.as_ref()) else {
        return ActualState::Unknown;
    };
    let Some(conditions) = status.conditions.as_ref() else {
        return ActualState::Unknown;
    };

    let progressing = conditions
        .iter()
        .find(|condition| condition.condition_type == CONDITION_TYPE_PROGRESSING);
    let Some(progressing) = progressing else {
        return ActualState::Unknown;
    };
    let (Some(progressing_reason), Some(spec_replicas)) =
        (progressing.reason.as_deref(), spec.replicas)
    else {
        return ActualState::Unknown;
    };

    if progressing_reason == PROGRESSING_REASON_FAILED {
        return ActualState::Failed;
    }

    // A deployment still rolling out a replica set can only be starting or
    // stopping, depending on which direction the replica count points.
    if PROGRESSING_REASONS_IN_PROGRESS.contains(&progressing_reason) {
        if spec_replicas == 0 {
            return ActualState::Stopping;
        }
        if spec_replicas == 1 {
            return ActualState::Starting;
        }
    }

    let available_replicas = status.available_replicas.unwrap_or(0);
    let unavailable_replicas = status.unavailable_replicas.unwrap_or(0);

    let available = conditions
        .iter()
        .find(|condition| condition.condition_type == CONDITION_TYPE_AVAILABLE);
    let Some(available) = available else {
        return ActualState::Unknown;
    };
    let Some(available_reason) = available.reason.as_deref() else {
        return ActualState::Unknown;
    };

    if progressing_reason == PROGRESSING_REASON_COMPLETE {
        if available_reason == AVAILABLE_REASON_MINIMUM_REPLICAS_AVAILABLE
            && spec_replicas == 0
            && available_replicas == 0
        {
            return ActualState::Stopped;
        }

        if available_reason == AVAILABLE_REASON_MINIMUM_REPLICAS_AVAILABLE
            && spec_replicas == available_replicas
            && unavailable_replicas == 0
        {
            return ActualState::Running;
        }

        if available_reason == AVAILABLE_REASON_MINIMUM_REPLICAS_AVAILABLE
            && spec_replicas == 0
            && available_replicas == 1
        {
            return ActualState::Stopping;
        }

        if (available_reason == AVAILABLE_REASON_MINIMUM_REPLICAS_AVAILABLE
            || available_reason == AVAILABLE_REASON_MINIMUM_REPLICAS_UNAVAILABLE)
            && spec_replicas == 1
            && available_replicas == 0
        {
            return ActualState::Starting;
        }
    }

    ActualState::Unknown
}
