//! Domain models

pub mod deployment;
pub mod deployment_log;
pub mod project;

pub use deployment::{Deployment, DeploymentId, DeploymentStatus, ProjectId, StatusChange};
pub use deployment_log::{DeploymentLogRecord, LogPage, LogType, NewLogRecord};
pub use project::Project;
