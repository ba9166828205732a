//! In-memory deployment store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::PlatformError;
use crate::models::deployment_log::log_order_key;
use crate::models::{
    Deployment, DeploymentId, DeploymentLogRecord, DeploymentStatus, LogPage, NewLogRecord,
    Project, ProjectId, StatusChange,
};

use super::{active_conflict, AppendOutcome, CasOutcome, DeploymentStore};

#[derive(Debug, Default)]
struct Tables {
    projects: HashMap<ProjectId, Project>,
    deployments: HashMap<DeploymentId, Deployment>,
    logs: HashMap<DeploymentId, Vec<DeploymentLogRecord>>,
    next_log_id: i64,
}

/// In-memory deployment store.
///
/// All tables sit behind one lock so that every trait operation is atomic.
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project. Projects are owned by the CRUD surface, so this
    /// only exists to seed the store.
    pub fn insert_project(&self, project: Project) -> Result<(), PlatformError> {
        let mut tables = self.write()?;
        tables.projects.insert(project.id.clone(), project);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, PlatformError> {
        self.tables
            .read()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, PlatformError> {
        self.tables
            .write()
            .map_err(|_| PlatformError::Internal("lock poisoned".to_string()))
    }
}

fn active_count(tables: &Tables, project_id: &ProjectId) -> u64 {
    tables
        .deployments
        .values()
        .filter(|d| &d.project_id == project_id && d.status.is_active())
        .count() as u64
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn get_project(&self, id: &ProjectId) -> Result<Option<Project>, PlatformError> {
        Ok(self.read()?.projects.get(id).cloned())
    }

    async fn project_by_subdomain(
        &self,
        subdomain: &str,
    ) -> Result<Option<Project>, PlatformError> {
        let tables = self.read()?;
        Ok(tables
            .projects
            .values()
            .find(|p| p.subdomain.as_deref() == Some(subdomain))
            .cloned())
    }

    async fn count_active(&self, project_id: &ProjectId) -> Result<u64, PlatformError> {
        Ok(active_count(&*self.read()?, project_id))
    }

    async fn create_queued(
        &self,
        project: &Project,
        now: DateTime<Utc>,
    ) -> Result<Deployment, PlatformError> {
        let mut tables = self.write()?;
        if active_count(&tables, &project.id) > 0 {
            return Err(active_conflict(&project.id));
        }

        let deployment = Deployment::queued(project.id.clone(), project.user_id.clone(), now);
        tables
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn get(&self, id: &DeploymentId) -> Result<Option<Deployment>, PlatformError> {
        Ok(self.read()?.deployments.get(id).cloned())
    }

    async fn remove(&self, id: &DeploymentId) -> Result<bool, PlatformError> {
        let mut tables = self.write()?;
        tables.logs.remove(id);
        Ok(tables.deployments.remove(id).is_some())
    }

    async fn compare_and_set_status(
        &self,
        id: &DeploymentId,
        expected: DeploymentStatus,
        change: &StatusChange,
    ) -> Result<CasOutcome, PlatformError> {
        let mut tables = self.write()?;
        let Some(deployment) = tables.deployments.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };

        if deployment.status != expected {
            return Ok(CasOutcome::Stale(deployment.clone()));
        }

        change.apply_to(deployment);
        Ok(CasOutcome::Updated(deployment.clone()))
    }

    async fn latest_deployed(
        &self,
        project_id: &ProjectId,
    ) -> Result<Option<Deployment>, PlatformError> {
        let tables = self.read()?;
        Ok(tables
            .deployments
            .values()
            .filter(|d| &d.project_id == project_id && d.status == DeploymentStatus::Deployed)
            .max_by_key(|d| d.updated_at)
            .cloned())
    }

    async fn append_log(&self, record: NewLogRecord) -> Result<AppendOutcome, PlatformError> {
        let mut tables = self.write()?;
        let tables = &mut *tables;

        let Some(deployment) = tables.deployments.get_mut(&record.deployment_id) else {
            return Err(PlatformError::NotFound(format!(
                "deployment {} not found",
                record.deployment_id
            )));
        };

        let logs = tables.logs.entry(record.deployment_id.clone()).or_default();
        if let Some(message_id) = &record.message_id {
            if logs
                .iter()
                .any(|l| l.message_id.as_deref() == Some(message_id.as_str()))
            {
                return Ok(AppendOutcome::Duplicate);
            }
        }

        tables.next_log_id += 1;
        let id = tables.next_log_id;
        logs.push(record.into_record(id));
        deployment.last_log_id = Some(id);

        Ok(AppendOutcome::Appended(id))
    }

    async fn list_logs(
        &self,
        id: &DeploymentId,
        page: LogPage,
    ) -> Result<Vec<DeploymentLogRecord>, PlatformError> {
        let tables = self.read()?;
        let mut logs = tables.logs.get(id).cloned().unwrap_or_default();
        logs.sort_by_key(log_order_key);

        Ok(logs
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect())
    }
}
