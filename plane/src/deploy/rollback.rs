//! Compensating action for a deployment launch
//!
//! A [`Rollback`] is armed right after the QUEUED row is inserted and before
//! the task runner is called. Exactly one of three things then happens:
//! the launch succeeds and the guard is disarmed, the launch fails and the
//! guard is run, or the launching future is dropped and the guard runs the
//! compensation on a background task.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::PlatformError;
use crate::models::{DeploymentId, DeploymentStatus, StatusChange};
use crate::store::{CasOutcome, DeploymentStore};

/// What the compensation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    /// The row was deleted (or was already gone)
    Removed,

    /// Deleting failed; the row was moved QUEUED -> FAILED instead
    MarkedFailed,

    /// Deleting failed and the row had already left QUEUED
    AlreadyMoved(DeploymentStatus),
}

/// Armed compensation for one launch
pub struct Rollback {
    store: Arc<dyn DeploymentStore>,
    deployment_id: Option<DeploymentId>,
}

impl Rollback {
    pub fn arm(store: Arc<dyn DeploymentStore>, deployment_id: DeploymentId) -> Self {
        Self {
            store,
            deployment_id: Some(deployment_id),
        }
    }

    /// The launch went through; nothing to undo
    pub fn disarm(mut self) {
        self.deployment_id = None;
    }

    /// Undo the launch now
    pub async fn run(mut self) -> Result<Compensation, PlatformError> {
        match self.deployment_id.take() {
            Some(id) => compensate(self.store.as_ref(), &id).await,
            None => Ok(Compensation::Removed),
        }
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        let Some(id) = self.deployment_id.take() else {
            return;
        };

        warn!(deployment_id = %id, "Launch abandoned, compensating in background");
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = compensate(store.as_ref(), &id).await {
                        error!(deployment_id = %id, "Background compensation failed: {}", e);
                    }
                });
            }
            Err(_) => {
                error!(deployment_id = %id, "No runtime to compensate abandoned launch");
            }
        }
    }
}

async fn compensate(
    store: &dyn DeploymentStore,
    id: &DeploymentId,
) -> Result<Compensation, PlatformError> {
    match store.remove(id).await {
        Ok(_) => {
            info!(deployment_id = %id, "Removed deployment after failed launch");
            return Ok(Compensation::Removed);
        }
        Err(e) => {
            warn!(deployment_id = %id, "Failed to remove deployment, marking it failed: {}", e);
        }
    }

    let change = StatusChange::new(DeploymentStatus::Failed, Utc::now());
    match store
        .compare_and_set_status(id, DeploymentStatus::Queued, &change)
        .await?
    {
        CasOutcome::Updated(_) => Ok(Compensation::MarkedFailed),
        CasOutcome::Stale(current) => Ok(Compensation::AlreadyMoved(current.status)),
        CasOutcome::Missing => Ok(Compensation::Removed),
    }
}
