//! Deployment storage backends
//!
//! The store owns deployment status. Every status write is a compare-and-set
//! on the recorded status, and creation re-checks the one-active-deployment
//! limit inside the same atomic scope as the insert.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::PlatformError;
use crate::models::{
    Deployment, DeploymentId, DeploymentLogRecord, DeploymentStatus, LogPage, NewLogRecord,
    Project, ProjectId, StatusChange,
};

/// Result of a compare-and-set on a deployment's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The recorded status matched and the change was written
    Updated(Deployment),

    /// The recorded status no longer matched; carries the current record
    Stale(Deployment),

    /// No such deployment
    Missing,
}

/// Result of appending a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored under the given id
    Appended(i64),

    /// A record with the same delivery message id already exists
    Duplicate,
}

/// Backend for deployments, their logs and the projects they belong to
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Get a project by id
    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, PlatformError>;

    /// Find the project using `subdomain` as its alias label
    async fn project_by_subdomain(&self, subdomain: &str)
        -> Result<Option<Project>, PlatformError>;

    /// Number of QUEUED or BUILDING deployments of a project
    async fn count_active(&self, project_id: &ProjectId) -> Result<u64, PlatformError>;

    /// Insert a QUEUED deployment for `project`.
    ///
    /// Fails with [`PlatformError::Conflict`] if the project already has an
    /// active deployment. The check and the insert are one atomic step.
    async fn create_queued(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Deployment, PlatformError>;

    /// Get a deployment by id
    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, PlatformError>;

    /// Delete a deployment and its logs. Returns whether a row was removed.
    async fn remove(&self, id: &DeploymentId) -> Result<bool, PlatformError>;

    /// Write `change` only if the recorded status is still `expected`
    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        change: &StatusChange,
    ) -> Result<CasOutcome, PlatformError>;

    /// Most recent DEPLOYED deployment of a project
    async fn latest_deployed(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Deployment>, PlatformError>;

    /// Append a log line and advance the deployment's last-log pointer in the
    /// same atomic step.
    ///
    /// Fails with [`PlatformError::NotFound`] if the deployment is gone.
    async fn append_log(&self, record: NewLogRecord) -> Result<AppendOutcome, PlatformError>;

    /// Log lines of a deployment in emission order
    async fn list_logs(
        &self,
        id: &DeploymentId,
        page: LogPage,
    ) -> Result<Vec<DeploymentLogRecord>, PlatformError>;
}

pub(crate) fn active_conflict(project_id: &ProjectId) -> PlatformError {
    PlatformError::Conflict(format!(
        "project {} already has a deployment in progress",
        project_id
    ))
}
