//! Remote Development Workspace Reconciliation Server
//!
//! Agents running inside Kubernetes clusters poll this server with the state
//! of the workspaces they manage; the server updates its records, diffs
//! desired against actual state, and answers with the per-workspace
//! configuration each agent should converge toward.

use std::sync::Arc;

use sqlx::SqlitePool;

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod service;

pub use config::Config;
pub use error::{Error, Result};

use infra::devfile::{DevfileAdapter, FlattenedDevfileEngine};
use infra::license::{LicenseChecker, StaticLicenseChecker};
use infra::sqlite::AgentRepository;
use infra::workspace_repository::WorkspaceRepository;
use service::agent_config::AgentConfigUpdater;
use service::desired_config::DesiredConfigGenerator;
use service::reconcile::ReconcileService;
use service::workspace::WorkspaceService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub license: Arc<dyn LicenseChecker>,
    pub agents: Arc<AgentRepository>,
    pub workspace_service: Arc<WorkspaceService>,
    pub agent_config_updater: Arc<AgentConfigUpdater>,
    pub reconcile_service: Arc<ReconcileService>,
}

/// Build the application state on top of an initialized database pool.
pub fn build_state(config: Arc<Config>, pool: SqlitePool) -> AppState {
    let agents = Arc::new(AgentRepository::new(pool.clone()));
    let workspaces = Arc::new(WorkspaceRepository::new(pool));
    let license: Arc<dyn LicenseChecker> = Arc::new(StaticLicenseChecker::new(config.licensed));

    let devfile_adapter = DevfileAdapter::new(Arc::new(FlattenedDevfileEngine));
    let generator = Arc::new(DesiredConfigGenerator::new(devfile_adapter));

    let workspace_service = Arc::new(WorkspaceService::new(workspaces.clone(), agents.clone()));
    let agent_config_updater = Arc::new(AgentConfigUpdater::new(agents.clone()));
    let reconcile_service = Arc::new(ReconcileService::new(workspaces, agents.clone(), generator));

    AppState {
        config,
        license,
        agents,
        workspace_service,
        agent_config_updater,
        reconcile_service,
    }
}
