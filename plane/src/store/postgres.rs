//! PostgreSQL deployment store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;

use crate::errors::PlatformError;
use crate::models::{
    Deployment, DeploymentId, DeploymentLogRecord, DeploymentStatus, LogPage, LogType,
    NewLogRecord, Project, ProjectId, StatusChange,
};

use super::{active_conflict, AppendOutcome, CasOutcome, DeploymentStore};

const DEPLOYMENT_COLUMNS: &str = "id, project_id, user_id, status, ready_url, last_log_id, \
                                  duration_secs, created_at, updated_at";

const LOG_COLUMNS: &str = "id, deployment_id, project_id, message, stack, log_type, sequence, \
                           message_id, timestamp";

const PROJECT_COLUMNS: &str = "id, user_id, name, source_code_url, subdomain, created_at";

/// PostgreSQL-backed deployment store.
///
/// A partial unique index on `deployments(project_id)` for QUEUED and
/// BUILDING rows backs the one-active-deployment limit, and creation locks
/// the project row so concurrent launches for one project serialise.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and create the tables if they don't exist
    pub async fn connect(url: &SecretString, max_connections: u32) -> Result<Self, PlatformError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url.expose_secret())
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to PostgreSQL deployment store");

        Ok(store)
    }

    /// Create a store from an existing connection pool
    pub async fn from_pool(pool: PgPool) -> Result<Self, PlatformError> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), PlatformError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                source_code_url TEXT NOT NULL,
                subdomain TEXT UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                ready_url TEXT,
                last_log_id BIGINT,
                duration_secs BIGINT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uniq_deployments_active_project
            ON deployments (project_id)
            WHERE status IN ('QUEUED', 'BUILDING')
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_project_status
            ON deployments (project_id, status, updated_at DESC)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deployment_logs (
                id BIGSERIAL PRIMARY KEY,
                deployment_id TEXT NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
                project_id TEXT NOT NULL,
                message TEXT NOT NULL,
                stack TEXT,
                log_type TEXT NOT NULL DEFAULT 'INFO',
                sequence BIGINT,
                message_id TEXT,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS uniq_deployment_logs_message
            ON deployment_logs (deployment_id, message_id)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn row_to_deployment(row: &PgRow) -> Result<Deployment, PlatformError> {
        let status: String = row.get("status");
        let status = status
            .parse::<DeploymentStatus>()
            .map_err(PlatformError::Internal)?;

        Ok(Deployment {
            id: DeploymentId::new(row.get::<String, _>("id")),
            project_id: ProjectId::new(row.get::<String, _>("project_id")),
            user_id: row.get("user_id"),
            status,
            ready_url: row.get("ready_url"),
            last_log_id: row.get("last_log_id"),
            duration_secs: row.get("duration_secs"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn row_to_log(row: &PgRow) -> DeploymentLogRecord {
        let log_type: String = row.get("log_type");
        DeploymentLogRecord {
            id: row.get("id"),
            deployment_id: DeploymentId::new(row.get::<String, _>("deployment_id")),
            project_id: ProjectId::new(row.get::<String, _>("project_id")),
            message: row.get("message"),
            stack: row.get("stack"),
            log_type: LogType::parse_lenient(Some(&log_type)),
            sequence: row.get("sequence"),
            message_id: row.get("message_id"),
            timestamp: row.get("timestamp"),
        }
    }

    fn row_to_project(row: &PgRow) -> Project {
        Project {
            id: ProjectId::new(row.get::<String, _>("id")),
            user_id: row.get("user_id"),
            name: row.get("name"),
            source_code_url: row.get("source_code_url"),
            subdomain: row.get("subdomain"),
            created_at: row.get("created_at"),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, PlatformError> {
        let row = sqlx::query(&format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_project))
    }

    async fn project_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Project>, PlatformError> {
        let row = sqlx::query(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE subdomain = $1"
        ))
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_project))
    }

    async fn count_active(&self, project_id: &ProjectId) -> Result<u64, PlatformError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM deployments
            WHERE project_id = $1 AND status IN ('QUEUED', 'BUILDING')
            "#,
        )
        .bind(project_id.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn create_queued(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Deployment, PlatformError> {
        let mut tx = self.pool.begin().await?;

        // Serialise creations for this project
        let locked = sqlx::query("SELECT id FROM projects WHERE id = $1 FOR UPDATE")
            .bind(project.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(PlatformError::NotFound(format!("project {} not found", project.id)));
        }

        let active: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM deployments
            WHERE project_id = $1 AND status IN ('QUEUED', 'BUILDING')
            "#,
        )
        .bind(project.id.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(active_conflict(&project.id));
        }

        let deployment = Deployment::queued(project.id.clone(), project.user_id.clone(), now);
        let inserted = sqlx::query(
            r#"
            INSERT INTO deployments (id, project_id, user_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(deployment.id.as_str())
        .bind(deployment.project_id.as_str())
        .bind(&deployment.user_id)
        .bind(deployment.status.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(active_conflict(&project.id)),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(deployment)
    }

    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, PlatformError> {
        let row = sqlx::query(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployments WHERE id = $1"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_deployment).transpose()
    }

    async fn remove(&self, id: &DeploymentId) -> Result<bool, PlatformError> {
        let result = sqlx::query("DELETE FROM deployments WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        change: &StatusChange,
    ) -> Result<CasOutcome, PlatformError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE deployments
            SET status = $1,
                updated_at = $2,
                ready_url = COALESCE($3, ready_url),
                duration_secs = CASE
                    WHEN $4 THEN GREATEST(0, EXTRACT(EPOCH FROM ($2 - created_at)))::BIGINT
                    ELSE duration_secs
                END
            WHERE id = $5 AND status = $6
            RETURNING {DEPLOYMENT_COLUMNS}
            "#
        ))
        .bind(change.status.as_str())
        .bind(change.at)
        .bind(change.ready_url.as_deref())
        .bind(change.status.is_terminal())
        .bind(id.as_str())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(CasOutcome::Updated(Self::row_to_deployment(&row)?));
        }

        match self.get(id).await? {
            Some(current) => Ok(CasOutcome::Stale(current)),
            None => Ok(CasOutcome::Missing),
        }
    }

    async fn latest_deployed(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Deployment>, PlatformError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {DEPLOYMENT_COLUMNS} FROM deployments
            WHERE project_id = $1 AND status = 'DEPLOYED'
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        ))
        .bind(project_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_deployment).transpose()
    }

    async fn append_log(&self, record: NewLogRecord) -> Result<AppendOutcome, PlatformError> {
        let mut tx = self.pool.begin().await?;

        // Lock the deployment so the last-log pointer moves in insert order
        let exists = sqlx::query("SELECT id FROM deployments WHERE id = $1 FOR UPDATE")
            .bind(record.deployment_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(PlatformError::NotFound(format!(
                "deployment {} not found",
                record.deployment_id
            )));
        }

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO deployment_logs (
                deployment_id, project_id, message, stack, log_type,
                sequence, message_id, timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (deployment_id, message_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(record.deployment_id.as_str())
        .bind(record.project_id.as_str())
        .bind(&record.message)
        .bind(record.stack.as_deref())
        .bind(record.log_type.as_str())
        .bind(record.sequence)
        .bind(record.message_id.as_deref())
        .bind(record.timestamp)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = id else {
            tx.rollback().await?;
            return Ok(AppendOutcome::Duplicate);
        };

        sqlx::query("UPDATE deployments SET last_log_id = $1 WHERE id = $2")
            .bind(id)
            .bind(record.deployment_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(AppendOutcome::Appended(id))
    }

    async fn list_logs(
        &self,
        id: &DeploymentId,
        page: LogPage,
    ) -> Result<Vec<DeploymentLogRecord>, PlatformError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {LOG_COLUMNS} FROM deployment_logs
            WHERE deployment_id = $1
            ORDER BY COALESCE(sequence, id), id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(id.as_str())
        .bind(i64::from(page.per_page))
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_log).collect())
    }
}
