//! Integration tests for the reconciliation server
//!
//! Every test boots its own in-process server instance and exercises the
//! HTTP surface the way an agent or user would.

use integration_tests::*;
use serde_json::json;

fn empty_reconcile(update_type: &str) -> serde_json::Value {
    json!({ "update_type": update_type, "workspace_agent_infos": [] })
}

// ============================================================================
// Health Tests
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let server = spawn_server().await;

    let response = server
        .client
        .get(server.api_url("/health"))
        .send()
        .await
        .expect("Failed to send health request");

    assert!(response.status().is_success());
    let health: HealthResponse = response.json().await.expect("Failed to parse health response");
    assert_eq!(health.status, "healthy");
}

// ============================================================================
// Agent Configuration Tests
// ============================================================================

#[tokio::test]
async fn test_agent_configuration_happy_path() {
    let server = spawn_server().await;
    let agent_id = server.register_agent("cluster-1").await;

    let response = server
        .configure_agent(
            agent_id,
            json!({
                "remote_development": {
                    "enabled": true,
                    "dns_zone": "workspaces.example.dev",
                    "network_policy": { "enabled": false }
                }
            }),
        )
        .await;

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "updated");
    assert_eq!(body["agent_config"]["enabled"], true);
    assert_eq!(body["agent_config"]["dns_zone"], "workspaces.example.dev");
    assert_eq!(body["agent_config"]["network_policy_enabled"], false);
    assert_eq!(
        body["agent_config"]["gitlab_workspaces_proxy_namespace"],
        "gitlab-workspaces"
    );
}

#[tokio::test]
async fn test_agent_configuration_without_section_is_skipped() {
    let server = spawn_server().await;
    let agent_id = server.register_agent("cluster-1").await;

    let response = server.configure_agent(agent_id, json!({})).await;

    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "skipped");
    assert_eq!(body["reason"], "no_config_file_entry_found");

    // No config was created: the agent cannot host workspaces
    let create = server
        .client
        .post(server.api_url("/workspaces"))
        .json(&json!({
            "agent_id": agent_id,
            "user_name": "dev",
            "user_email": "dev@example.com",
            "processed_devfile": EXAMPLE_DEVFILE
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(create.status(), 403);
}

#[tokio::test]
async fn test_agent_configuration_enabled_is_immutable() {
    let server = spawn_server().await;
    let agent_id = server.register_agent("cluster-1").await;

    let enable = json!({
        "remote_development": { "enabled": true, "dns_zone": "example.dev" }
    });
    assert!(server.configure_agent(agent_id, enable).await.status().is_success());

    let disable = json!({
        "remote_development": { "enabled": false, "dns_zone": "example.dev" }
    });
    let response = server.configure_agent(agent_id, disable).await;
    assert_eq!(response.status(), 400);

    let error: ErrorResponse = response.json().await.unwrap();
    let details = error.details.expect("expected field details");
    assert_eq!(details[0].field, "enabled");

    // The record still has enabled set: workspaces can be created
    server.create_workspace(agent_id).await;
}

#[tokio::test]
async fn test_agent_configuration_rejects_invalid_dns_zone() {
    let server = spawn_server().await;
    let agent_id = server.register_agent("cluster-1").await;

    let response = server
        .configure_agent(
            agent_id,
            json!({
                "remote_development": { "enabled": true, "dns_zone": "Bad_Zone.Example" }
            }),
        )
        .await;

    assert_eq!(response.status(), 400);
    let error: ErrorResponse = response.json().await.unwrap();
    assert_eq!(error.details.unwrap()[0].field, "dns_zone");
}

#[tokio::test]
async fn test_unknown_agent_configuration_is_404() {
    let server = spawn_server().await;

    let response = server
        .configure_agent(999, json!({ "remote_development": { "dns_zone": "a.dev" } }))
        .await;
    assert_eq!(response.status(), 404);
}

// ============================================================================
// License Tests
// ============================================================================

#[tokio::test]
async fn test_unlicensed_server_forbids_remote_development() {
    let server = spawn_server_with_license(false).await;
    let agent_id = server.register_agent("cluster-1").await;

    let configure = server
        .configure_agent(
            agent_id,
            json!({ "remote_development": { "enabled": true, "dns_zone": "a.dev" } }),
        )
        .await;
    assert_eq!(configure.status(), 403);

    let reconcile = server.reconcile_raw(agent_id, empty_reconcile("full")).await;
    assert_eq!(reconcile.status(), 403);
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

#[tokio::test]
async fn test_full_reconcile_returns_config_for_new_workspace() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    let workspace = server.create_workspace(agent_id).await;

    let response = server.reconcile(agent_id, empty_reconcile("full")).await;

    assert_eq!(response.workspace_rails_infos.len(), 1);
    let info = &response.workspace_rails_infos[0];
    assert_eq!(info.name, workspace.name);
    assert_eq!(info.namespace, workspace.namespace);
    assert_eq!(info.desired_state, "Running");
    assert_eq!(info.actual_state, "CreationRequested");

    let config = info.config_to_apply.as_ref().expect("full update must carry config");
    assert!(config.contains("kind: ConfigMap"));
    assert!(config.contains("kind: Deployment"));
    assert!(config.contains("kind: NetworkPolicy"));
    assert!(config.contains("replicas: 1"));
    assert!(config.contains(&format!("{}-workspace-inventory", workspace.name)));
}

#[tokio::test]
async fn test_full_reconcile_is_idempotent() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    server.create_workspace(agent_id).await;

    let first = server.reconcile(agent_id, empty_reconcile("full")).await;
    let second = server.reconcile(agent_id, empty_reconcile("full")).await;

    assert_eq!(
        first.workspace_rails_infos[0].config_to_apply,
        second.workspace_rails_infos[0].config_to_apply
    );
}

#[tokio::test]
async fn test_stopped_workspace_gets_zero_replicas() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    let workspace = server.create_workspace(agent_id).await;

    let response = server.set_desired_state(workspace.id, "Stopped").await;
    assert!(response.status().is_success());

    let reconcile = server.reconcile(agent_id, empty_reconcile("full")).await;
    let config = reconcile.workspace_rails_infos[0]
        .config_to_apply
        .as_ref()
        .unwrap();
    assert!(config.contains("replicas: 0"));
    assert!(!config.contains("kind: Ingress"));
}

#[tokio::test]
async fn test_partial_reconcile_applies_reported_state() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    let workspace = server.create_workspace(agent_id).await;

    // Acknowledge the initial desired state first
    server.reconcile(agent_id, empty_reconcile("full")).await;

    let response = server
        .reconcile(
            agent_id,
            json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": workspace.name,
                    "namespace": workspace.namespace,
                    "previous_actual_state": "Starting",
                    "current_actual_state": "Running",
                    "deployment_resource_version": "7",
                    "workspace_exists": true
                }]
            }),
        )
        .await;

    let updated = server.get_workspace(workspace.id).await;
    assert_eq!(updated.actual_state, "Running");
    assert_eq!(updated.deployment_resource_version.as_deref(), Some("7"));
    assert_eq!(updated.desired_state, "Running");

    // The acknowledgment row carries no config: the agent already has it
    assert_eq!(response.workspace_rails_infos.len(), 1);
    assert!(response.workspace_rails_infos[0].config_to_apply.is_none());
}

#[tokio::test]
async fn test_partial_reconcile_ships_config_only_after_changes() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    let workspace = server.create_workspace(agent_id).await;

    server.reconcile(agent_id, empty_reconcile("full")).await;

    // Quiet cycle: nothing to say
    let response = server.reconcile(agent_id, empty_reconcile("partial")).await;
    assert!(response.workspace_rails_infos.is_empty());

    // Desired-state change: next partial cycle ships config once
    server.set_desired_state(workspace.id, "Stopped").await;
    let response = server.reconcile(agent_id, empty_reconcile("partial")).await;
    assert_eq!(response.workspace_rails_infos.len(), 1);
    assert!(response.workspace_rails_infos[0].config_to_apply.is_some());

    let response = server.reconcile(agent_id, empty_reconcile("partial")).await;
    assert!(response.workspace_rails_infos.is_empty());
}

#[tokio::test]
async fn test_termination_lifecycle() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;
    let workspace = server.create_workspace(agent_id).await;

    server.reconcile(agent_id, empty_reconcile("full")).await;
    server.set_desired_state(workspace.id, "Terminated").await;

    // Agent reports the resources are gone: teardown confirmed
    server
        .reconcile(
            agent_id,
            json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": workspace.name,
                    "namespace": workspace.namespace,
                    "current_actual_state": "Stopped",
                    "workspace_exists": false
                }]
            }),
        )
        .await;

    let updated = server.get_workspace(workspace.id).await;
    assert_eq!(updated.actual_state, "Terminated");

    // A stale report cannot resurrect the workspace
    server
        .reconcile(
            agent_id,
            json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": workspace.name,
                    "namespace": workspace.namespace,
                    "current_actual_state": "Running",
                    "deployment_resource_version": "9",
                    "workspace_exists": true
                }]
            }),
        )
        .await;
    let after = server.get_workspace(workspace.id).await;
    assert_eq!(after.actual_state, "Terminated");

    // Fully terminated workspaces disappear from full reconciliation
    let response = server.reconcile(agent_id, empty_reconcile("full")).await;
    assert!(response.workspace_rails_infos.is_empty());

    // And the desired state can never leave Terminated
    let change = server.set_desired_state(workspace.id, "Running").await;
    assert_eq!(change.status(), 400);
}

#[tokio::test]
async fn test_orphaned_agent_info_is_not_an_error() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;

    let response = server
        .reconcile(
            agent_id,
            json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": "workspace-already-deleted",
                    "namespace": "ns-already-deleted",
                    "current_actual_state": "Running",
                    "workspace_exists": true
                }]
            }),
        )
        .await;

    assert!(response.workspace_rails_infos.is_empty());
}

#[tokio::test]
async fn test_reconcile_without_enabled_config_is_forbidden() {
    let server = spawn_server().await;
    let agent_id = server.register_agent("cluster-1").await;

    let response = server.reconcile_raw(agent_id, empty_reconcile("full")).await;
    assert_eq!(response.status(), 403);
}

// ============================================================================
// Request Validation Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_update_type_is_rejected() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;

    let response = server
        .reconcile_raw(agent_id, empty_reconcile("incremental"))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_workspace_state_is_rejected() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;

    let response = server
        .reconcile_raw(
            agent_id,
            json!({
                "update_type": "partial",
                "workspace_agent_infos": [{
                    "name": "ws1",
                    "namespace": "ns1",
                    "current_actual_state": "Hibernating",
                    "workspace_exists": true
                }]
            }),
        )
        .await;
    assert!(response.status().is_client_error());
}

// ============================================================================
// Workspace API Tests
// ============================================================================

#[tokio::test]
async fn test_workspace_lifecycle_over_http() {
    let server = spawn_server().await;
    let agent_id = server.enabled_agent("cluster-1").await;

    let workspace = server.create_workspace(agent_id).await;
    assert_eq!(workspace.agent_id, agent_id);
    assert_eq!(workspace.dns_zone, "workspaces.example.dev");
    assert!(workspace.name.starts_with(&format!("workspace-{}-", agent_id)));

    let listed: serde_json::Value = server
        .client
        .get(server.api_url("/workspaces"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 1);

    let fetched = server.get_workspace(workspace.id).await;
    assert_eq!(fetched.name, workspace.name);

    let missing = server
        .client
        .get(server.api_url("/workspaces/4242"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
