//! Task runner launching build workers
//!
//! Launching is fire-and-forget: the worker reports back through the status
//! and log channels, never through the launch call.

mod memory;
#[cfg(feature = "aws")]
mod ecs;

pub use memory::MemoryRunner;
#[cfg(feature = "aws")]
pub use ecs::{EcsRunner, EcsRunnerOptions};

use async_trait::async_trait;

use crate::errors::PlatformError;
use crate::models::{DeploymentId, ProjectId};

/// Everything a build worker needs to run one deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub deployment_id: DeploymentId,
    pub project_id: ProjectId,
    pub user_id: String,

    /// Git URL of the project source
    pub source_url: String,

    /// Queue the worker publishes status events to
    pub status_channel: String,

    /// Queue the worker publishes log events to
    pub log_channel: String,
}

impl LaunchParams {
    /// Environment handed to the worker container
    pub fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            ("PROJECT_ID", self.project_id.to_string()),
            ("DEPLOYMENT_ID", self.deployment_id.to_string()),
            ("USER_ID", self.user_id.clone()),
            ("GIT_REPOSITORY_URL", self.source_url.clone()),
            ("STATUS_QUEUE_URL", self.status_channel.clone()),
            ("LOG_QUEUE_URL", self.log_channel.clone()),
        ]
    }
}

/// Reference to a launched worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Launches build workers
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn launch(&self, params: &LaunchParams) -> Result<TaskHandle, PlatformError>;
}
