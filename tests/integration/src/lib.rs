//! Integration test support for the reconciliation server
//!
//! Each test boots its own server instance on an ephemeral port with a
//! private database, then drives it over HTTP like an agent or user would.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::Deserialize;

use reconciler_server::{api, build_state, infra::sqlite, Config};

static SERVER_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A resolved devfile that produces a deployment, service, volume claim and
/// a public endpoint.
pub const EXAMPLE_DEVFILE: &str = r#"
components:
- name: tooling-container
  container:
    image: quay.io/example/universal-developer-image:latest
    command:
    - "/workspace-data/.editor/start_server.sh"
    env:
    - name: EDITOR_PORT
      value: "60001"
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

/// A server instance under test
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

/// Boot a licensed server instance.
pub async fn spawn_server() -> TestServer {
    spawn_server_with_license(true).await
}

/// Boot a server instance with the given license state.
pub async fn spawn_server_with_license(licensed: bool) -> TestServer {
    let db_path = std::env::temp_dir().join(format!(
        "reconciler-it-{}-{}.db",
        std::process::id(),
        SERVER_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let database_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let config = Arc::new(Config {
        http_host: "127.0.0.1".to_string(),
        http_port: 0,
        database_url: database_url.clone(),
        licensed,
    });

    let pool = sqlite::init_pool(&database_url)
        .await
        .expect("Failed to initialize test database");
    let state = build_state(config, pool);
    let app = api::http::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .expect("Test server failed");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    /// Register an agent and return its id.
    pub async fn register_agent(&self, name: &str) -> i64 {
        let response = self
            .client
            .post(self.api_url("/agents"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .expect("Failed to register agent");
        assert!(response.status().is_success());

        let agent: AgentResponse = response.json().await.expect("Failed to parse agent");
        agent.id
    }

    /// Report an agent config file body.
    pub async fn configure_agent(&self, agent_id: i64, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.api_url(&format!("/agents/{}/configuration", agent_id)))
            .json(&body)
            .send()
            .await
            .expect("Failed to send agent configuration")
    }

    /// Register an agent with remote development enabled, returning its id.
    pub async fn enabled_agent(&self, name: &str) -> i64 {
        let agent_id = self.register_agent(name).await;
        let response = self
            .configure_agent(
                agent_id,
                serde_json::json!({
                    "remote_development": {
                        "enabled": true,
                        "dns_zone": "workspaces.example.dev"
                    }
                }),
            )
            .await;
        assert!(response.status().is_success());
        agent_id
    }

    /// Create a workspace on an agent.
    pub async fn create_workspace(&self, agent_id: i64) -> WorkspaceResponse {
        let response = self
            .client
            .post(self.api_url("/workspaces"))
            .json(&serde_json::json!({
                "agent_id": agent_id,
                "user_name": "dev",
                "user_email": "dev@example.com",
                "processed_devfile": EXAMPLE_DEVFILE
            }))
            .send()
            .await
            .expect("Failed to create workspace");
        assert!(
            response.status().is_success(),
            "Create workspace failed: {}",
            response.status()
        );
        response.json().await.expect("Failed to parse workspace")
    }

    /// Fetch a workspace by id.
    pub async fn get_workspace(&self, id: i64) -> WorkspaceResponse {
        let response = self
            .client
            .get(self.api_url(&format!("/workspaces/{}", id)))
            .send()
            .await
            .expect("Failed to get workspace");
        assert!(response.status().is_success());
        response.json().await.expect("Failed to parse workspace")
    }

    /// Move a workspace's desired state.
    pub async fn set_desired_state(&self, id: i64, desired_state: &str) -> reqwest::Response {
        self.client
            .put(self.api_url(&format!("/workspaces/{}/desired_state", id)))
            .json(&serde_json::json!({ "desired_state": desired_state }))
            .send()
            .await
            .expect("Failed to update desired state")
    }

    /// Send a raw reconcile request.
    pub async fn reconcile_raw(&self, agent_id: i64, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.api_url(&format!("/agents/{}/reconcile", agent_id)))
            .json(&body)
            .send()
            .await
            .expect("Failed to send reconcile request")
    }

    /// Send a reconcile request and parse the payload.
    pub async fn reconcile(&self, agent_id: i64, body: serde_json::Value) -> ReconcileResponse {
        let response = self.reconcile_raw(agent_id, body).await;
        assert!(
            response.status().is_success(),
            "Reconcile failed: {}",
            response.status()
        );
        response.json().await.expect("Failed to parse reconcile response")
    }
}

// ==================== Response Types ====================

#[derive(Debug, Deserialize)]
pub struct AgentResponse {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct WorkspaceResponse {
    pub id: i64,
    pub name: String,
    pub namespace: String,
    pub agent_id: i64,
    pub desired_state: String,
    pub actual_state: String,
    pub deployment_resource_version: Option<String>,
    pub dns_zone: String,
}

#[derive(Debug, Deserialize)]
pub struct RailsInfoResponse {
    pub name: String,
    pub namespace: String,
    pub desired_state: String,
    pub actual_state: String,
    pub deployment_resource_version: Option<String>,
    pub config_to_apply: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileResponse {
    pub workspace_rails_infos: Vec<RailsInfoResponse>,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub details: Option<Vec<FieldDetail>>,
}

#[derive(Debug, Deserialize)]
pub struct FieldDetail {
    pub field: String,
    pub message: String,
}
