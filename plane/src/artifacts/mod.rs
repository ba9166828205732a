//! Artifact repository
//!
//! Build workers upload a deployment's static output under
//! `{outputs_prefix}/{deployment_id}/`. The control plane only needs to check
//! that a deployment was published, and to remove its objects on deletion.

mod memory;
#[cfg(feature = "aws")]
mod s3;

pub use memory::MemoryArtifacts;
#[cfg(feature = "aws")]
pub use s3::S3Artifacts;

use async_trait::async_trait;

use crate::errors::PlatformError;

/// Object store holding build outputs
#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    /// Whether an object exists at `key`
    async fn exists(&self, key: &str) -> Result<bool, PlatformError>;

    /// Every key starting with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<String>, PlatformError>;

    /// Delete the given keys. Missing keys are not an error.
    async fn delete_many(&self, keys: &[String]) -> Result<(), PlatformError>;
}

/// Key layout of build outputs in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    outputs_prefix: String,
}

impl ArtifactLayout {
    pub fn new(outputs_prefix: &str) -> Self {
        Self {
            outputs_prefix: outputs_prefix.trim_matches('/').to_string(),
        }
    }

    pub fn outputs_prefix(&self) -> &str {
        &self.outputs_prefix
    }

    /// Directory holding every object of one deployment, with trailing slash
    pub fn deployment_dir(&self, prefix: &str) -> String {
        if self.outputs_prefix.is_empty() {
            format!("{}/", prefix)
        } else {
            format!("{}/{}/", self.outputs_prefix, prefix)
        }
    }

    /// Object whose presence marks a deployment as published
    pub fn index_key(&self, prefix: &str) -> String {
        format!("{}index.html", self.deployment_dir(prefix))
    }
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new("__outputs")
    }
}
