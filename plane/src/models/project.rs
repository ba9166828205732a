//! Project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::ProjectId;

/// A user project. Owned by the project CRUD surface, read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: String,
    pub name: String,

    /// Git URL the build worker clones
    pub source_code_url: String,

    /// Optional alias label served with the project's latest deployment
    pub subdomain: Option<String>,
    pub created_at: DateTime<Utc>,
}
