//! Workspace repository for database operations

use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

use crate::domain::workspace::{ActualState, DesiredState, Workspace};
use crate::error::{Error, Result};
use crate::infra::sqlite::parse_timestamp;

const WORKSPACE_COLUMNS: &str = r#"
    id, name, namespace, agent_id, user_name, user_email,
    desired_state, actual_state, deployment_resource_version,
    desired_state_version, responded_to_agent_version,
    desired_state_updated_at, responded_to_agent_at,
    processed_devfile, dns_zone, created_at, updated_at
"#;

/// Database row for workspace
#[derive(Debug, FromRow)]
struct WorkspaceRow {
    id: i64,
    name: String,
    namespace: String,
    agent_id: i64,
    user_name: String,
    user_email: String,
    desired_state: String,
    actual_state: String,
    deployment_resource_version: Option<String>,
    desired_state_version: i64,
    responded_to_agent_version: i64,
    desired_state_updated_at: String,
    responded_to_agent_at: Option<String>,
    processed_devfile: String,
    dns_zone: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<WorkspaceRow> for Workspace {
    type Error = Error;

    fn try_from(row: WorkspaceRow) -> Result<Self> {
        let desired_state = DesiredState::from_str(&row.desired_state)
            .ok_or_else(|| Error::Internal(format!("Invalid desired state: {}", row.desired_state)))?;
        let actual_state = ActualState::from_str(&row.actual_state)
            .ok_or_else(|| Error::Internal(format!("Invalid actual state: {}", row.actual_state)))?;

        let responded_to_agent_at = row
            .responded_to_agent_at
            .as_deref()
            .map(|t| parse_timestamp(t, "responded_to_agent_at"))
            .transpose()?;

        Ok(Workspace {
            id: row.id,
            name: row.name,
            namespace: row.namespace,
            agent_id: row.agent_id,
            user_name: row.user_name,
            user_email: row.user_email,
            desired_state,
            actual_state,
            deployment_resource_version: row.deployment_resource_version,
            desired_state_version: row.desired_state_version,
            responded_to_agent_version: row.responded_to_agent_version,
            desired_state_updated_at: parse_timestamp(
                &row.desired_state_updated_at,
                "desired_state_updated_at",
            )?,
            responded_to_agent_at,
            processed_devfile: row.processed_devfile,
            dns_zone: row.dns_zone,
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
        })
    }
}

/// Fields needed to insert a workspace record.
#[derive(Debug, Clone)]
pub struct NewWorkspace {
    pub name: String,
    pub namespace: String,
    pub agent_id: i64,
    pub user_name: String,
    pub user_email: String,
    pub desired_state: DesiredState,
    pub actual_state: ActualState,
    pub processed_devfile: String,
    pub dns_zone: String,
}

/// Workspace repository for database operations
pub struct WorkspaceRepository {
    pool: SqlitePool,
}

impl WorkspaceRepository {
    /// Create a new repository with the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new workspace record
    pub async fn insert(&self, new: NewWorkspace) -> Result<Workspace> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO workspaces
                (name, namespace, agent_id, user_name, user_email,
                 desired_state, actual_state, desired_state_version,
                 responded_to_agent_version, desired_state_updated_at,
                 processed_devfile, dns_zone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, 0, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.name)
        .bind(&new.namespace)
        .bind(new.agent_id)
        .bind(&new.user_name)
        .bind(&new.user_email)
        .bind(new.desired_state.as_str())
        .bind(new.actual_state.as_str())
        .bind(now.to_rfc3339())
        .bind(&new.processed_devfile)
        .bind(&new.dns_zone)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    /// Get a workspace by ID
    pub async fn get(&self, id: i64) -> Result<Workspace> {
        let row: WorkspaceRow = sqlx::query_as(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(Error::WorkspaceNotFound(id))?;

        row.try_into()
    }

    /// Find the workspace an agent-reported (name, namespace) pair refers to
    pub async fn find_by_agent_name_namespace(
        &self,
        agent_id: i64,
        name: &str,
        namespace: &str,
    ) -> Result<Option<Workspace>> {
        let row: Option<WorkspaceRow> = sqlx::query_as(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE agent_id = ? AND name = ? AND namespace = ?"
        ))
        .bind(agent_id)
        .bind(name)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List all workspaces
    pub async fn list(&self) -> Result<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&format!(
            "SELECT {WORKSPACE_COLUMNS} FROM workspaces ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// List every workspace of an agent that has not fully terminated
    pub async fn list_active_for_agent(&self, agent_id: i64) -> Result<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {WORKSPACE_COLUMNS} FROM workspaces
            WHERE agent_id = ?
              AND NOT (desired_state = 'Terminated' AND actual_state = 'Terminated')
            ORDER BY id
            "#
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// List workspaces whose desired state changed after the last response to the agent
    pub async fn list_needing_resync_for_agent(&self, agent_id: i64) -> Result<Vec<Workspace>> {
        let rows: Vec<WorkspaceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {WORKSPACE_COLUMNS} FROM workspaces
            WHERE agent_id = ?
              AND desired_state_version > responded_to_agent_version
              AND NOT (desired_state = 'Terminated' AND actual_state = 'Terminated')
            ORDER BY id
            "#
        ))
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply an agent-reported actual state.
    ///
    /// The deployment resource version is only overwritten when the agent
    /// provided one. Desired-state columns are untouched.
    pub async fn update_agent_reported_state(
        &self,
        id: i64,
        actual_state: ActualState,
        deployment_resource_version: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE workspaces
            SET actual_state = ?,
                deployment_resource_version = COALESCE(?, deployment_resource_version),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(actual_state.as_str())
        .bind(deployment_resource_version)
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::WorkspaceNotFound(id));
        }

        Ok(())
    }

    /// Set a new desired state, bumping the version counter
    pub async fn update_desired_state(&self, id: i64, desired_state: DesiredState) -> Result<Workspace> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE workspaces
            SET desired_state = ?,
                desired_state_version = desired_state_version + 1,
                desired_state_updated_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(desired_state.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::WorkspaceNotFound(id));
        }

        self.get(id).await
    }

    /// Record which desired-state version each returned workspace was responded with.
    ///
    /// Uses the version snapshots loaded during selection, not the current
    /// column value, so a desired-state change racing the response is not
    /// accidentally acknowledged.
    pub async fn mark_responded(&self, responses: &[(i64, i64)]) -> Result<()> {
        if responses.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for (id, version) in responses {
            sqlx::query(
                r#"
                UPDATE workspaces
                SET responded_to_agent_version = ?,
                    responded_to_agent_at = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(version)
            .bind(&now)
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
