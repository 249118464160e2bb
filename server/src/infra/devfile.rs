//! Devfile processing
//!
//! Translates a fully-resolved devfile into the Kubernetes manifests that make
//! up a workspace. The translation sits behind the [`DevfileProcessor`] trait;
//! [`DevfileAdapter`] is the boundary the rest of the pipeline talks to, and it
//! degrades parse failures to an empty manifest list so one broken workspace
//! cannot take down a whole reconcile cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec, PodTemplateSpec,
    ResourceRequirements, SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Deserialize;
use tracing::warn;

use crate::domain::manifest::{to_manifest, Manifest};
use crate::error::{Error, Result};

const DEFAULT_RUN_AS_USER: i64 = 5001;
const DEFAULT_VOLUME_SIZE: &str = "15Gi";
const EXPOSURE_PUBLIC: &str = "public";
const PORT_PLACEHOLDER: &str = "{port}";

/// Parameters threaded from the desired-config generator into devfile processing.
#[derive(Debug, Clone)]
pub struct DevfileParams {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    /// Ingress host template with a `{port}` placeholder
    pub domain_template: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub user_name: String,
    pub user_email: String,
}

/// Failure modes of devfile processing.
#[derive(Debug, thiserror::Error)]
pub enum DevfileError {
    /// The devfile could not be interpreted. Recoverable: the workspace
    /// simply gets no manifests this cycle.
    #[error("Devfile parse error: {0}")]
    Parse(String),

    /// Anything else. Propagated, not swallowed.
    #[error("Devfile processing error: {0}")]
    Internal(String),
}

/// Translates a resolved devfile into Kubernetes manifests.
#[cfg_attr(test, mockall::automock)]
pub trait DevfileProcessor: Send + Sync {
    fn process(
        &self,
        devfile: &str,
        params: &DevfileParams,
    ) -> std::result::Result<Vec<Manifest>, DevfileError>;
}

/// Boundary wrapper around a [`DevfileProcessor`].
pub struct DevfileAdapter {
    processor: Arc<dyn DevfileProcessor>,
}

impl DevfileAdapter {
    pub fn new(processor: Arc<dyn DevfileProcessor>) -> Self {
        Self { processor }
    }

    /// Run the processor, degrading its designated parse failure to `[]`.
    pub fn get_all(&self, devfile: &str, params: &DevfileParams) -> Result<Vec<Manifest>> {
        match self.processor.process(devfile, params) {
            Ok(manifests) => Ok(manifests),
            Err(DevfileError::Parse(details)) => {
                warn!(
                    error_type = "reconcile_devfile_parser_error",
                    workspace_name = %params.name,
                    workspace_namespace = %params.namespace,
                    error_details = %details,
                    "Error processing devfile"
                );
                Ok(Vec::new())
            }
            Err(DevfileError::Internal(details)) => Err(Error::DevfileProcessing(details)),
        }
    }
}

// ---------------------------------------------------------------------------
// Flattened devfile model

#[derive(Debug, Deserialize)]
struct Devfile {
    #[serde(default)]
    components: Vec<DevfileComponent>,
}

#[derive(Debug, Deserialize)]
struct DevfileComponent {
    name: String,
    #[serde(default)]
    container: Option<DevfileContainer>,
    #[serde(default)]
    volume: Option<DevfileVolume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevfileContainer {
    image: String,
    #[serde(default)]
    command: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: Vec<DevfileEnv>,
    #[serde(default)]
    memory_limit: Option<String>,
    #[serde(default)]
    cpu_limit: Option<String>,
    #[serde(default)]
    endpoints: Vec<DevfileEndpoint>,
    #[serde(default)]
    volume_mounts: Vec<DevfileVolumeMount>,
}

#[derive(Debug, Deserialize)]
struct DevfileEnv {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DevfileEndpoint {
    name: String,
    target_port: i32,
    #[serde(default)]
    exposure: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DevfileVolumeMount {
    name: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct DevfileVolume {
    #[serde(default)]
    size: Option<String>,
}

// ---------------------------------------------------------------------------
// Built-in processor

/// Processor for devfiles that have already been flattened and resolved.
pub struct FlattenedDevfileEngine;

impl DevfileProcessor for FlattenedDevfileEngine {
    fn process(
        &self,
        devfile: &str,
        params: &DevfileParams,
    ) -> std::result::Result<Vec<Manifest>, DevfileError> {
        let devfile: Devfile =
            serde_yaml::from_str(devfile).map_err(|e| DevfileError::Parse(e.to_string()))?;

        let containers: Vec<(&str, &DevfileContainer)> = devfile
            .components
            .iter()
            .filter_map(|c| c.container.as_ref().map(|container| (c.name.as_str(), container)))
            .collect();
        let volumes: Vec<(&str, &DevfileVolume)> = devfile
            .components
            .iter()
            .filter_map(|c| c.volume.as_ref().map(|volume| (c.name.as_str(), volume)))
            .collect();

        if containers.is_empty() {
            return Ok(Vec::new());
        }

        let endpoints: Vec<&DevfileEndpoint> =
            containers.iter().flat_map(|(_, c)| c.endpoints.iter()).collect();

        let mut manifests = Vec::new();
        manifests.push(internal(to_manifest(&build_deployment(&containers, &volumes, params)))?);
        if !endpoints.is_empty() {
            manifests.push(internal(to_manifest(&build_service(&endpoints, params)))?);
        }
        for (name, volume) in &volumes {
            manifests.push(internal(to_manifest(&build_pvc(name, volume, params)))?);
        }
        if params.replicas > 0 {
            if let Some(ingress) = build_ingress(&endpoints, params) {
                manifests.push(internal(to_manifest(&ingress))?);
            }
        }

        Ok(manifests)
    }
}

fn internal(result: std::result::Result<Manifest, serde_yaml::Error>) -> std::result::Result<Manifest, DevfileError> {
    result.map_err(|e| DevfileError::Internal(e.to_string()))
}

fn object_meta(params: &DevfileParams, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(params.namespace.clone()),
        labels: Some(params.labels.clone()),
        annotations: Some(params.annotations.clone()),
        ..Default::default()
    }
}

fn build_deployment(
    containers: &[(&str, &DevfileContainer)],
    volumes: &[(&str, &DevfileVolume)],
    params: &DevfileParams,
) -> Deployment {
    let pod_volumes: Vec<Volume> = volumes
        .iter()
        .map(|(name, _)| Volume {
            name: name.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: format!("{}-{}", params.name, name),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    Deployment {
        metadata: object_meta(params, &params.name),
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas),
            selector: LabelSelector {
                match_labels: Some(params.labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(object_meta(params, &params.name)),
                spec: Some(PodSpec {
                    containers: containers
                        .iter()
                        .map(|(name, container)| build_container(name, container, params))
                        .collect(),
                    volumes: (!pod_volumes.is_empty()).then_some(pod_volumes),
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        run_as_user: Some(DEFAULT_RUN_AS_USER),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_container(name: &str, container: &DevfileContainer, params: &DevfileParams) -> Container {
    let mut env: Vec<EnvVar> = container
        .env
        .iter()
        .map(|e| EnvVar {
            name: e.name.clone(),
            value: Some(e.value.clone()),
            ..Default::default()
        })
        .collect();
    // Default git identity for the workspace owner
    for (key, value) in [
        ("GIT_AUTHOR_NAME", &params.user_name),
        ("GIT_AUTHOR_EMAIL", &params.user_email),
        ("GIT_COMMITTER_NAME", &params.user_name),
        ("GIT_COMMITTER_EMAIL", &params.user_email),
    ] {
        env.push(EnvVar {
            name: key.to_string(),
            value: Some(value.clone()),
            ..Default::default()
        });
    }

    let mut limits: BTreeMap<String, Quantity> = BTreeMap::new();
    if let Some(memory) = &container.memory_limit {
        limits.insert("memory".to_string(), Quantity(memory.clone()));
    }
    if let Some(cpu) = &container.cpu_limit {
        limits.insert("cpu".to_string(), Quantity(cpu.clone()));
    }

    Container {
        name: name.to_string(),
        image: Some(container.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        command: (!container.command.is_empty()).then(|| container.command.clone()),
        args: (!container.args.is_empty()).then(|| container.args.clone()),
        env: Some(env),
        ports: (!container.endpoints.is_empty()).then(|| {
            container
                .endpoints
                .iter()
                .map(|endpoint| ContainerPort {
                    container_port: endpoint.target_port,
                    name: Some(endpoint.name.clone()),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                })
                .collect()
        }),
        resources: (!limits.is_empty()).then(|| ResourceRequirements {
            limits: Some(limits),
            ..Default::default()
        }),
        volume_mounts: (!container.volume_mounts.is_empty()).then(|| {
            container
                .volume_mounts
                .iter()
                .map(|mount| VolumeMount {
                    name: mount.name.clone(),
                    mount_path: mount.path.clone(),
                    ..Default::default()
                })
                .collect()
        }),
        security_context: Some(SecurityContext {
            allow_privilege_escalation: Some(false),
            privileged: Some(false),
            run_as_non_root: Some(true),
            run_as_user: Some(DEFAULT_RUN_AS_USER),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_service(endpoints: &[&DevfileEndpoint], params: &DevfileParams) -> Service {
    Service {
        metadata: object_meta(params, &params.name),
        spec: Some(ServiceSpec {
            ports: Some(
                endpoints
                    .iter()
                    .map(|endpoint| ServicePort {
                        name: Some(endpoint.name.clone()),
                        port: endpoint.target_port,
                        target_port: Some(IntOrString::Int(endpoint.target_port)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            selector: Some(params.labels.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pvc(name: &str, volume: &DevfileVolume, params: &DevfileParams) -> PersistentVolumeClaim {
    let size = volume.size.clone().unwrap_or_else(|| DEFAULT_VOLUME_SIZE.to_string());

    PersistentVolumeClaim {
        metadata: object_meta(params, &format!("{}-{}", params.name, name)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_ingress(endpoints: &[&DevfileEndpoint], params: &DevfileParams) -> Option<Ingress> {
    let rules: Vec<IngressRule> = endpoints
        .iter()
        .filter(|endpoint| endpoint.exposure.as_deref() == Some(EXPOSURE_PUBLIC))
        .map(|endpoint| IngressRule {
            host: Some(
                params
                    .domain_template
                    .replace(PORT_PLACEHOLDER, &endpoint.target_port.to_string()),
            ),
            http: Some(HTTPIngressRuleValue {
                paths: vec![HTTPIngressPath {
                    path: Some("/".to_string()),
                    path_type: "Prefix".to_string(),
                    backend: IngressBackend {
                        service: Some(IngressServiceBackend {
                            name: params.name.clone(),
                            port: Some(ServiceBackendPort {
                                number: Some(endpoint.target_port),
                                ..Default::default()
                            }),
                        }),
                        ..Default::default()
                    },
                }],
            }),
        })
        .collect();

    if rules.is_empty() {
        return None;
    }

    Some(Ingress {
        metadata: object_meta(params, &params.name),
        spec: Some(IngressSpec {
            rules: Some(rules),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Representative resolved devfile shared across the crate's tests.
#[cfg(test)]
pub(crate) const EXAMPLE_DEVFILE: &str = r#"
components:
- name: tooling-container
  container:
    image: quay.io/example/universal-developer-image:latest
    command:
    - "/workspace-data/.editor/start_server.sh"
    env:
    - name: EDITOR_PORT
      value: "60001"
    memoryLimit: 1Gi
    cpuLimit: 500m
    endpoints:
    - name: editor-server
      targetPort: 60001
      exposure: public
    volumeMounts:
    - name: workspace-data
      path: "/projects"
- name: workspace-data
  volume:
    size: 15Gi
"#;
