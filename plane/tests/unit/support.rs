//! Shared fixtures

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use shipyard::artifacts::{ArtifactLayout, MemoryArtifacts};
use shipyard::cache::existence::ExistenceCache;
use shipyard::deploy::launcher::{self, Launcher};
use shipyard::models::{Deployment, DeploymentStatus, Project, ProjectId, StatusChange};
use shipyard::runner::MemoryRunner;
use shipyard::store::{DeploymentStore, MemoryStore};

pub const ROOT_DOMAIN: &str = "shipyard.dev";

pub fn project(id: &str, subdomain: Option<&str>) -> Project {
    Project {
        id: ProjectId::new(id),
        user_id: "user-1".to_string(),
        name: format!("{}-site", id),
        source_code_url: format!("https://github.com/acme/{}", id),
        subdomain: subdomain.map(str::to_string),
        created_at: Utc::now(),
    }
}

pub struct Plane {
    pub store: Arc<MemoryStore>,
    pub runner: Arc<MemoryRunner>,
    pub artifacts: Arc<MemoryArtifacts>,
    pub cache: ExistenceCache,
    pub layout: ArtifactLayout,
    pub launcher: Arc<Launcher>,
}

impl Plane {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(MemoryRunner::new());
        let artifacts = Arc::new(MemoryArtifacts::new());
        let cache = ExistenceCache::default();
        let layout = ArtifactLayout::default();
        let launcher = Arc::new(Launcher::new(
            launcher::Options {
                status_channel: "memory://status".to_string(),
                log_channel: "memory://logs".to_string(),
            },
            store.clone(),
            runner.clone(),
            artifacts.clone(),
            layout.clone(),
            cache.clone(),
        ));
        Self {
            store,
            runner,
            artifacts,
            cache,
            layout,
            launcher,
        }
    }

    pub fn with_project(self, id: &str, subdomain: Option<&str>) -> Self {
        self.store.insert_project(project(id, subdomain)).unwrap();
        self
    }

    /// Drive a fresh deployment of `project_id` straight to `status`
    pub async fn deployment_in(&self, project_id: &str, status: DeploymentStatus) -> Deployment {
        let project = self
            .store
            .get_project(&ProjectId::new(project_id))
            .await
            .unwrap()
            .unwrap();
        let mut deployment = self.store.create_queued(&project, Utc::now()).await.unwrap();

        let path: &[DeploymentStatus] = match status {
            DeploymentStatus::Queued => &[],
            DeploymentStatus::Building => &[DeploymentStatus::Building],
            DeploymentStatus::Deployed => &[DeploymentStatus::Building, DeploymentStatus::Deployed],
            DeploymentStatus::Failed => &[DeploymentStatus::Failed],
        };
        for next in path {
            let change = StatusChange::new(*next, Utc::now());
            match self
                .store
                .compare_and_set_status(&deployment.id, deployment.status, &change)
                .await
                .unwrap()
            {
                shipyard::store::CasOutcome::Updated(updated) => deployment = updated,
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        deployment
    }
}

/// Poll `check` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
