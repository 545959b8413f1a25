use std::collections::HashSet;

use tracing::{error, info};
use uuid::Uuid;

use crate::auth::repo_types::{User, UserSummary};
use crate::error::ApiError;
use crate::state::AppState;
use crate::sync::dto::{ApplyResponse, ApplyStats, PreviewResponse, PreviewStats, RemovedUser};
use crate::sync::repo;

/// One consistent snapshot of the second store's email set, normalized to
/// lowercase. A connection failure fails the whole operation.
async fn upstream_email_snapshot(state: &AppState) -> Result<HashSet<String>, ApiError> {
    match repo::fetch_profile_emails(&state.api_db).await {
        Ok(emails) => Ok(emails.into_iter().map(|e| e.to_lowercase()).collect()),
        Err(e) => {
            error!(error = %e, "error fetching API service emails");
            Err(ApiError::Upstream(
                "Failed to connect to API service database".to_string(),
            ))
        }
    }
}

/// A local user is orphaned iff its normalized email is absent from both the
/// upstream set and the protected set.
pub fn compute_orphans(
    local: &[UserSummary],
    upstream: &HashSet<String>,
    protected: &HashSet<String>,
) -> Vec<UserSummary> {
    local
        .iter()
        .filter(|user| {
            let email = user.email.to_lowercase();
            !upstream.contains(&email) && !protected.contains(&email)
        })
        .cloned()
        .collect()
}

pub async fn preview_orphaned_users(
    state: &AppState,
    protected: HashSet<String>,
) -> Result<PreviewResponse, ApiError> {
    let upstream = upstream_email_snapshot(state).await?;
    let local = User::list_all(&state.db).await?;
    let orphaned_users = compute_orphans(&local, &upstream, &protected);

    info!(
        upstream = upstream.len(),
        local = local.len(),
        orphaned = orphaned_users.len(),
        "sync preview computed"
    );
    Ok(PreviewResponse {
        success: true,
        message: "Preview completed successfully".to_string(),
        stats: PreviewStats {
            api_service_users: upstream.len(),
            auth_service_users: local.len(),
            orphaned_users_to_remove: orphaned_users.len(),
        },
        orphaned_users,
    })
}

pub async fn remove_orphaned_users(
    state: &AppState,
    protected: HashSet<String>,
) -> Result<ApplyResponse, ApiError> {
    let upstream = upstream_email_snapshot(state).await?;
    let local = User::list_all(&state.db).await?;
    let orphaned_users = compute_orphans(&local, &upstream, &protected);
    let before = local.len();

    if !orphaned_users.is_empty() {
        let ids: Vec<Uuid> = orphaned_users.iter().map(|u| u.id).collect();
        let deleted = User::delete_many_by_ids(&state.db, &ids).await?;
        info!(deleted, "orphaned users removed");
    }

    let removed = orphaned_users.len();
    let message = if removed > 0 {
        "Sync completed successfully"
    } else {
        "No orphaned users found - databases are in sync"
    };

    Ok(ApplyResponse {
        success: true,
        message: message.to_string(),
        stats: ApplyStats {
            api_service_users: upstream.len(),
            auth_service_users_before: before,
            orphaned_users_removed: removed,
            auth_service_users_after: before - removed,
        },
        removed_users: orphaned_users.iter().map(RemovedUser::from).collect(),
    })
}
