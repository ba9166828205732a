//! Deployment log models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::{DeploymentId, ProjectId};

/// Severity of a build log line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogType {
    #[default]
    Info,
    Warn,
    Error,
}

impl LogType {
    /// Lenient parse: absent, empty and unknown values all map to INFO
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_uppercase()).as_deref() {
            Some("WARN") | Some("WARNING") => LogType::Warn,
            Some("ERROR") => LogType::Error,
            _ => LogType::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "INFO",
            LogType::Warn => "WARN",
            LogType::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentLogRecord {
    /// Store-wide increasing id
    pub id: i64,
    pub deployment_id: DeploymentId,
    pub project_id: ProjectId,
    pub message: String,
    pub stack: Option<String>,
    pub log_type: LogType,

    /// Worker emission counter, when the worker sends one
    pub sequence: Option<i64>,

    /// Delivery id of the channel message the line arrived in
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A log line to append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogRecord {
    pub deployment_id: DeploymentId,
    pub project_id: ProjectId,
    pub message: String,
    pub stack: Option<String>,
    pub log_type: LogType,
    pub sequence: Option<i64>,
    pub message_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewLogRecord {
    pub fn into_record(self, id: i64) -> DeploymentLogRecord {
        DeploymentLogRecord {
            id,
            deployment_id: self.deployment_id,
            project_id: self.project_id,
            message: self.message,
            stack: self.stack,
            log_type: self.log_type,
            sequence: self.sequence,
            message_id: self.message_id,
            timestamp: self.timestamp,
        }
    }
}

/// Page selector for log listings, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPage {
    pub page: u32,
    pub per_page: u32,
}

impl LogPage {
    pub const MAX_PER_PAGE: u32 = 500;

    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, Self::MAX_PER_PAGE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

impl Default for LogPage {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

/// Sort key for listing: worker sequence first when present, insertion id
/// otherwise
pub fn log_order_key(record: &DeploymentLogRecord) -> (i64, i64) {
    (record.sequence.unwrap_or(record.id), record.id)
}
