//! Deployment models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque deployment identifier, also used as the artifact prefix and as the
/// subdomain label the deployment is served under
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentId(String);

impl DeploymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier. The simple uuid form is lowercase
    /// alphanumeric so it is always a valid subdomain label.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeploymentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DeploymentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Project identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProjectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Created, build worker not yet reporting
    Queued,

    /// Build worker is running
    Building,

    /// Artifacts published
    Deployed,

    /// Build failed or could not be launched
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::Building => "BUILDING",
            DeploymentStatus::Deployed => "DEPLOYED",
            DeploymentStatus::Failed => "FAILED",
        }
    }

    /// DEPLOYED and FAILED accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Deployed | DeploymentStatus::Failed)
    }

    /// QUEUED and BUILDING count against the one-active-deployment limit
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentStatus {
    type Err = String;

    /// Accepts canonical names and the build worker's short names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "QUEUED" | "QUEUE" => Ok(DeploymentStatus::Queued),
            "BUILDING" | "PROG" => Ok(DeploymentStatus::Building),
            "DEPLOYED" | "READY" => Ok(DeploymentStatus::Deployed),
            "FAILED" | "FAIL" => Ok(DeploymentStatus::Failed),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// A deployment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub user_id: String,
    pub status: DeploymentStatus,

    /// Public URL, set once the deployment reaches DEPLOYED
    pub ready_url: Option<String>,

    /// Id of the most recently appended log record
    pub last_log_id: Option<i64>,

    /// Seconds from creation to the terminal transition
    pub duration_secs: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    /// A fresh deployment in QUEUED
    pub fn queued(project_id: ProjectId, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: DeploymentId::generate(),
            project_id,
            user_id,
            status: DeploymentStatus::Queued,
            ready_url: None,
            last_log_id: None,
            duration_secs: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A status change to persist together with its side attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: DeploymentStatus,
    pub ready_url: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(status: DeploymentStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            ready_url: None,
            at,
        }
    }

    pub fn with_ready_url(mut self, ready_url: String) -> Self {
        self.ready_url = Some(ready_url);
        self
    }

    /// Apply the change to a record. Duration is only set on terminal
    /// transitions.
    pub fn apply_to(&self, deployment: &mut Deployment) {
        deployment.status = self.status;
        deployment.updated_at = self.at;
        if let Some(ready_url) = &self.ready_url {
            deployment.ready_url = Some(ready_url.clone());
        }
        if self.status.is_terminal() {
            deployment.duration_secs = Some((self.at - deployment.created_at).num_seconds().max(0));
        }
    }
}
