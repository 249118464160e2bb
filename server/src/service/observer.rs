//! Outgoing payload observation
//!
//! A diagnostic tap over the rails infos about to be returned to an agent.
//! Config payloads are multi-kilobyte YAML streams, so they are omitted from
//! the logged entries rather than logged and redacted.

use tracing::debug;

use crate::domain::types::RailsInfo;
use crate::domain::workspace::{ActualState, DesiredState, UpdateType};

/// Rails-info fields that are safe to log.
#[derive(Debug)]
#[allow(dead_code)] // fields exist to appear in the Debug output
pub struct ObservedRailsInfo<'a> {
    name: &'a str,
    namespace: &'a str,
    desired_state: DesiredState,
    actual_state: ActualState,
    deployment_resource_version: Option<&'a str>,
}

/// Log the payload about to be returned to the agent.
///
/// Takes the payload by shared reference: observation can neither mutate nor
/// drop entries.
pub fn observe_rails_infos(agent_id: i64, update_type: UpdateType, rails_infos: &[RailsInfo]) {
    let observed = strip_configs(rails_infos);
    debug!(
        agent_id,
        update_type = ?update_type,
        count = rails_infos.len(),
        workspace_rails_infos = ?observed,
        "Returning workspace rails infos"
    );
}

fn strip_configs(rails_infos: &[RailsInfo]) -> Vec<ObservedRailsInfo<'_>> {
    rails_infos
        .iter()
        .map(|info| ObservedRailsInfo {
            name: &info.name,
            namespace: &info.namespace,
            desired_state: info.desired_state,
            actual_state: info.actual_state,
            deployment_resource_version: info.deployment_resource_version.as_deref(),
        })
        .collect()
}
