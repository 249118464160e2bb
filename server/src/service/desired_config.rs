//! Desired configuration generation
//!
//! Computes the ordered manifest list that represents a workspace's desired
//! state: the inventory ConfigMap, the devfile-derived workspace resources,
//! and (when the agent config asks for it) a NetworkPolicy. Pure with respect
//! to its inputs and deterministic, so repeated generation within one cycle
//! yields byte-identical output.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::api::networking::v1::{
    NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicyPort, NetworkPolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::domain::agent::AgentConfig;
use crate::domain::manifest::{to_manifest, Manifest};
use crate::domain::workspace::Workspace;
use crate::error::{Error, Result};
use crate::infra::devfile::{DevfileAdapter, DevfileParams};

const AGENT_ID_LABEL: &str = "agent.gitlab.com/id";
const INVENTORY_ID_LABEL: &str = "cli-utils.sigs.k8s.io/inventory-id";
const OWNING_INVENTORY_ANNOTATION: &str = "config.k8s.io/owning-inventory";
const HOST_TEMPLATE_ANNOTATION: &str = "workspaces.gitlab.com/host-template";
const WORKSPACE_ID_ANNOTATION: &str = "workspaces.gitlab.com/id";

const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";
const KUBE_SYSTEM_NAMESPACE: &str = "kube-system";
const DNS_PORT: i32 = 53;

/// Generates the desired Kubernetes configuration for workspaces.
pub struct DesiredConfigGenerator {
    devfile_adapter: DevfileAdapter,
}

impl DesiredConfigGenerator {
    pub fn new(devfile_adapter: DevfileAdapter) -> Self {
        Self { devfile_adapter }
    }

    /// Compute the full ordered manifest list for a workspace snapshot.
    ///
    /// Returns an empty list when the devfile produced nothing: a workspace
    /// without workspace resources gets no inventory or policy either.
    pub fn generate(&self, workspace: &Workspace, agent_config: &AgentConfig) -> Result<Vec<Manifest>> {
        let started = workspace.desired_state_running();

        let params = DevfileParams {
            name: workspace.name.clone(),
            namespace: workspace.namespace.clone(),
            replicas: if started { 1 } else { 0 },
            domain_template: workspace.host_template(),
            labels: standard_labels(workspace),
            annotations: standard_annotations(workspace),
            user_name: workspace.user_name.clone(),
            user_email: workspace.user_email.clone(),
        };

        let workspace_manifests = self
            .devfile_adapter
            .get_all(&workspace.processed_devfile, &params)?;
        if workspace_manifests.is_empty() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::with_capacity(workspace_manifests.len() + 2);
        manifests.push(inventory_config_map(workspace, &params.labels)?);
        manifests.extend(workspace_manifests);
        if agent_config.network_policy_enabled {
            manifests.push(network_policy(
                workspace,
                &params,
                &agent_config.gitlab_workspaces_proxy_namespace,
            )?);
        }

        Ok(manifests)
    }
}

fn standard_labels(workspace: &Workspace) -> BTreeMap<String, String> {
    BTreeMap::from([(AGENT_ID_LABEL.to_string(), workspace.agent_id.to_string())])
}

fn standard_annotations(workspace: &Workspace) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            OWNING_INVENTORY_ANNOTATION.to_string(),
            workspace.inventory_name(),
        ),
        (HOST_TEMPLATE_ANNOTATION.to_string(), workspace.host_template()),
        (WORKSPACE_ID_ANNOTATION.to_string(), workspace.id.to_string()),
    ])
}

/// The inventory object all other generated resources declare as their owner.
fn inventory_config_map(workspace: &Workspace, labels: &BTreeMap<String, String>) -> Result<Manifest> {
    let mut inventory_labels = labels.clone();
    inventory_labels.insert(INVENTORY_ID_LABEL.to_string(), workspace.inventory_name());

    let config_map = ConfigMap {
        metadata: ObjectMeta {
            name: Some(workspace.inventory_name()),
            namespace: Some(workspace.namespace.clone()),
            labels: Some(inventory_labels),
            ..Default::default()
        },
        ..Default::default()
    };

    to_manifest(&config_map).map_err(serialization_error)
}

/// Restrict workspace traffic to the workspaces proxy plus cluster DNS.
fn network_policy(
    workspace: &Workspace,
    params: &DevfileParams,
    proxy_namespace: &str,
) -> Result<Manifest> {
    let policy = NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(workspace.name.clone()),
            namespace: Some(workspace.namespace.clone()),
            labels: Some(params.labels.clone()),
            annotations: Some(params.annotations.clone()),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![namespace_peer(proxy_namespace)]),
                ..Default::default()
            }]),
            egress: Some(vec![NetworkPolicyEgressRule {
                to: Some(vec![namespace_peer(KUBE_SYSTEM_NAMESPACE)]),
                ports: Some(vec![dns_port("TCP"), dns_port("UDP")]),
            }]),
        }),
    };

    to_manifest(&policy).map_err(serialization_error)
}

fn namespace_peer(namespace: &str) -> NetworkPolicyPeer {
    NetworkPolicyPeer {
        namespace_selector: Some(LabelSelector {
            match_labels: Some(BTreeMap::from([(
                NAMESPACE_NAME_LABEL.to_string(),
                namespace.to_string(),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn dns_port(protocol: &str) -> NetworkPolicyPort {
    NetworkPolicyPort {
        port: Some(IntOrString::Int(DNS_PORT)),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

fn serialization_error(err: serde_yaml::Error) -> Error {
    Error::Internal(format!("Failed to serialize manifest: {}", err))
}
