//! Wire messages published by build workers
//!
//! A build worker reports progress on two queues: one carrying
//! [`StatusEvent`]s and one carrying [`LogEvent`]s. Both are JSON objects with
//! camelCase keys. Unknown keys are ignored so that older and newer workers can
//! share a queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Build status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// Deployment the status belongs to
    pub deployment_id: String,

    /// Owning project
    #[serde(default)]
    pub project_id: String,

    /// Status name, e.g. `BUILDING` (legacy workers send `PROG`)
    #[serde(default, alias = "Status")]
    pub status: String,

    /// Emission time on the worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Per-deployment emission counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

/// One line of build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Deployment the line belongs to
    pub deployment_id: String,

    /// Owning project
    #[serde(default)]
    pub project_id: String,

    /// Log line, ANSI escapes already stripped by the worker
    #[serde(default)]
    pub message: String,

    /// Stack trace for error lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// `INFO`, `WARN` or `ERROR`; absent means `INFO`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_type: Option<String>,

    /// Emission time on the worker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Per-deployment emission counter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
}

impl StatusEvent {
    /// Decode a queue message body
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

impl LogEvent {
    /// Decode a queue message body
    pub fn from_json(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Whether the event carries no content worth storing
    pub fn is_empty(&self) -> bool {
        self.message.trim().is_empty()
    }
}
