//! SQLite database layer

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::domain::agent::{Agent, AgentConfig};
use crate::error::{Error, Result};

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        if let Some(path) = path.split('?').next() {
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    // Enable WAL mode for better concurrent performance
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

/// Database row for agent
#[derive(Debug, FromRow)]
struct AgentRow {
    id: i64,
    name: String,
    created_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = Error;

    fn try_from(row: AgentRow) -> Result<Self> {
        Ok(Agent {
            id: row.id,
            name: row.name,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
        })
    }
}

/// Database row for agent config
#[derive(Debug, FromRow)]
struct AgentConfigRow {
    id: i64,
    agent_id: i64,
    enabled: bool,
    dns_zone: String,
    network_policy_enabled: bool,
    gitlab_workspaces_proxy_namespace: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AgentConfigRow> for AgentConfig {
    type Error = Error;

    fn try_from(row: AgentConfigRow) -> Result<Self> {
        Ok(AgentConfig {
            id: row.id,
            agent_id: row.agent_id,
            enabled: row.enabled,
            dns_zone: row.dns_zone,
            network_policy_enabled: row.network_policy_enabled,
            gitlab_workspaces_proxy_namespace: row.gitlab_workspaces_proxy_namespace,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        })
    }
}

/// Fields persisted when an agent's config file is applied.
#[derive(Debug, Clone)]
pub struct AgentConfigUpdate {
    pub enabled: bool,
    pub dns_zone: String,
    pub network_policy_enabled: bool,
    pub gitlab_workspaces_proxy_namespace: String,
}

/// Agent repository for database operations
pub struct AgentRepository {
    pool: SqlitePool,
}

impl AgentRepository {
    /// Create a new repository with the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new agent
    pub async fn create(&self, name: &str) -> Result<Agent> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO agents (name, created_at)
            VALUES (?, ?)
            "#,
        )
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    /// Get an agent by ID
    pub async fn get(&self, id: i64) -> Result<Agent> {
        let row: AgentRow = sqlx::query_as(
            r#"
            SELECT id, name, created_at
            FROM agents
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::AgentNotFound(id))?;

        row.try_into()
    }

    /// Get the remote development config for an agent, if one exists
    pub async fn get_config(&self, agent_id: i64) -> Result<Option<AgentConfig>> {
        let row: Option<AgentConfigRow> = sqlx::query_as(
            r#"
            SELECT id, agent_id, enabled, dns_zone, network_policy_enabled,
                   gitlab_workspaces_proxy_namespace, created_at, updated_at
            FROM agent_configs
            WHERE agent_id = ?
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Create or update the one config record for an agent
    pub async fn save_config(&self, agent_id: i64, update: AgentConfigUpdate) -> Result<AgentConfig> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO agent_configs
                (agent_id, enabled, dns_zone, network_policy_enabled,
                 gitlab_workspaces_proxy_namespace, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (agent_id) DO UPDATE SET
                enabled = excluded.enabled,
                dns_zone = excluded.dns_zone,
                network_policy_enabled = excluded.network_policy_enabled,
                gitlab_workspaces_proxy_namespace = excluded.gitlab_workspaces_proxy_namespace,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(agent_id)
        .bind(update.enabled)
        .bind(&update.dns_zone)
        .bind(update.network_policy_enabled)
        .bind(&update.gitlab_workspaces_proxy_namespace)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get_config(agent_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Agent config missing after save: {}", agent_id)))
    }
}

#[cfg(test)]
pub(crate) async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_agent() {
        let pool = create_test_pool().await;
        let repo = AgentRepository::new(pool);

        let agent = repo.create("cluster-1").await.expect("Failed to create agent");
        assert_eq!(agent.name, "cluster-1");

        let fetched = repo.get(agent.id).await.expect("Failed to get agent");
        assert_eq!(fetched.id, agent.id);
        assert_eq!(fetched.name, "cluster-1");
    }

    #[tokio::test]
    async fn test_get_missing_agent() {
        let pool = create_test_pool().await;
        let repo = AgentRepository::new(pool);

        let result = repo.get(42).await;
        assert!(matches!(result, Err(Error::AgentNotFound(42))));
    }

    #[tokio::test]
    async fn test_save_config_inserts_then_updates() {
        let pool = create_test_pool().await;
        let repo = AgentRepository::new(pool);
        let agent = repo.create("cluster-1").await.unwrap();

        assert!(repo.get_config(agent.id).await.unwrap().is_none());

        let config = repo
            .save_config(
                agent.id,
                AgentConfigUpdate {
                    enabled: true,
                    dns_zone: "workspaces.example.dev".to_string(),
                    network_policy_enabled: true,
                    gitlab_workspaces_proxy_namespace: "gitlab-workspaces".to_string(),
                },
            )
            .await
            .expect("Failed to save config");
        assert!(config.enabled);
        assert_eq!(config.dns_zone, "workspaces.example.dev");

        let updated = repo
            .save_config(
                agent.id,
                AgentConfigUpdate {
                    enabled: true,
                    dns_zone: "other.example.dev".to_string(),
                    network_policy_enabled: false,
                    gitlab_workspaces_proxy_namespace: "proxy-ns".to_string(),
                },
            )
            .await
            .expect("Failed to update config");
        assert_eq!(updated.id, config.id);
        assert_eq!(updated.dns_zone, "other.example.dev");
        assert!(!updated.network_policy_enabled);
    }
}
