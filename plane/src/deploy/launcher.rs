//! Deployment launcher
//!
//! Creating a deployment inserts a QUEUED row and starts a build worker as
//! one unit. The row is never left behind in QUEUED when the worker could not
//! be started.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactLayout, ArtifactRepository};
use crate::cache::existence::ExistenceCache;
use crate::deploy::cleanup::remove_artifacts;
use crate::deploy::rollback::Rollback;
use crate::errors::PlatformError;
use crate::models::{Deployment, DeploymentId, DeploymentLogRecord, LogPage, ProjectId};
use crate::runner::{LaunchParams, TaskRunner};
use crate::store::DeploymentStore;

/// Launcher options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Address of the status channel handed to workers
    pub status_channel: String,

    /// Address of the log channel handed to workers
    pub log_channel: String,
}

/// Creates, reads and deletes deployments
pub struct Launcher {
    options: Options,
    store: Arc<dyn DeploymentStore>,
    runner: Arc<dyn TaskRunner>,
    artifacts: Arc<dyn ArtifactRepository>,
    layout: ArtifactLayout,
    cache: ExistenceCache,
}

impl Launcher {
    pub fn new(
        options: Options,
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn TaskRunner>,
        artifacts: Arc<dyn ArtifactRepository>,
        layout: ArtifactLayout,
        cache: ExistenceCache,
    ) -> Self {
        Self {
            options,
            store,
            runner,
            artifacts,
            layout,
            cache,
        }
    }

    /// Create a deployment for a project and start its build
    pub async fn create_deployment(
        &self,
        project_id: &ProjectId,
    ) -> Result<Deployment, PlatformError> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound("project not found".to_string()))?;

        if self.store.count_active(&project.id).await? > 0 {
            return Err(PlatformError::Conflict(
                "a deployment is already queued for this project".to_string(),
            ));
        }

        // The store re-checks the active count atomically with the insert
        let deployment = self.store.create_queued(&project, Utc::now()).await?;
        let rollback = Rollback::arm(self.store.clone(), deployment.id.clone());

        let params = LaunchParams {
            deployment_id: deployment.id.clone(),
            project_id: project.id.clone(),
            user_id: project.user_id.clone(),
            source_url: project.source_code_url.clone(),
            status_channel: self.options.status_channel.clone(),
            log_channel: self.options.log_channel.clone(),
        };

        match self.runner.launch(&params).await {
            Ok(handle) => {
                rollback.disarm();
                info!(
                    deployment_id = %deployment.id,
                    project_id = %project.id,
                    task_id = %handle.task_id,
                    "Deployment queued"
                );
                Ok(deployment)
            }
            Err(e) => {
                error!(deployment_id = %deployment.id, "Failed to launch build: {}", e);
                match rollback.run().await {
                    Ok(outcome) => {
                        info!(deployment_id = %deployment.id, ?outcome, "Launch rolled back")
                    }
                    Err(rollback_err) => error!(
                        deployment_id = %deployment.id,
                        "Failed to roll back launch: {}", rollback_err
                    ),
                }
                Err(PlatformError::Internal(format!("failed to launch build: {}", e)))
            }
        }
    }

    pub async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, PlatformError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PlatformError::NotFound("deployment not found".to_string()))
    }

    /// Log lines of a deployment in emission order
    pub async fn list_logs(
        &self,
        id: &DeploymentId,
        page: LogPage,
    ) -> Result<Vec<DeploymentLogRecord>, PlatformError> {
        self.get_deployment(id).await?;
        self.store.list_logs(id, page).await
    }

    /// Delete a finished deployment together with its artifacts.
    ///
    /// Artifacts go first so that a failed cleanup leaves the row in place
    /// and the delete can be retried.
    pub async fn delete_deployment(&self, id: &DeploymentId) -> Result<usize, PlatformError> {
        let deployment = self.get_deployment(id).await?;
        if deployment.status.is_active() {
            return Err(PlatformError::Conflict(format!(
                "deployment is {} and cannot be deleted yet",
                deployment.status
            )));
        }

        let removed = remove_artifacts(self.artifacts.as_ref(), &self.layout, id.as_str()).await?;

        if !self.store.remove(id).await? {
            warn!(deployment_id = %id, "Deployment row already gone");
        }
        self.cache.invalidate(id.as_str());

        info!(deployment_id = %id, artifacts = removed, "Deployment deleted");
        Ok(removed)
    }
}
