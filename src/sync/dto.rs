use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::repo_types::UserSummary;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQuery {
    /// Comma-separated emails excluded from orphan classification.
    pub admin_emails: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStats {
    pub api_service_users: usize,
    pub auth_service_users: usize,
    pub orphaned_users_to_remove: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyStats {
    pub api_service_users: usize,
    pub auth_service_users_before: usize,
    pub orphaned_users_removed: usize,
    pub auth_service_users_after: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

impl From<&UserSummary> for RemovedUser {
    fn from(user: &UserSummary) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    pub message: String,
    pub stats: PreviewStats,
    pub orphaned_users: Vec<UserSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub success: bool,
    pub message: String,
    pub stats: ApplyStats,
    pub removed_users: Vec<RemovedUser>,
}
