use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    Json,
};
use tracing::instrument;

use crate::error::ApiError;
use crate::state::AppState;
use crate::sync::dto::{ApplyResponse, PreviewResponse, SyncQuery};
use crate::sync::service;

fn protected_set(query: &SyncQuery) -> HashSet<String> {
    query
        .admin_emails
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Reports which users would be removed, without mutating anything.
#[instrument(skip(state))]
pub async fn preview_sync(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let result = service::preview_orphaned_users(&state, protected_set(&query)).await?;
    Ok(Json(result))
}

/// Removes local users absent from the API service's profile set.
#[instrument(skip(state))]
pub async fn sync_users(
    State(state): State<AppState>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<ApplyResponse>, ApiError> {
    let result = service::remove_orphaned_users(&state, protected_set(&query)).await?;
    Ok(Json(result))
}
