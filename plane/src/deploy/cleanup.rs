//! Artifact cleanup for deleted deployments

use tracing::{debug, info};

use crate::artifacts::{ArtifactLayout, ArtifactRepository};
use crate::errors::PlatformError;

/// Delete every object under a deployment's prefix, returning how many were
/// removed
pub async fn remove_artifacts(
    artifacts: &dyn ArtifactRepository,
    layout: &ArtifactLayout,
    prefix: &str,
) -> Result<usize, PlatformError> {
    let dir = layout.deployment_dir(prefix);
    let keys = artifacts.list(&dir).await?;
    if keys.is_empty() {
        debug!(prefix, "No artifacts to remove");
        return Ok(0);
    }

    artifacts.delete_many(&keys).await?;
    info!(prefix, count = keys.len(), "Removed deployment artifacts");
    Ok(keys.len())
}
