// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Entity sync routes (require a session and a usable QuickBooks connection).
//! Middleware is applied in routes/mod.rs.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::SyncedRecord;
use crate::services::SyncReport;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync/{entity}/pull", post(pull))
        .route("/api/sync/{entity}/push", post(push_pending))
        .route("/api/sync/{entity}/{local_id}/push", post(push_one))
        .route("/api/sync/{entity}/{local_id}/remote", delete(delete_remote))
}

/// Sync bookkeeping of one record.
#[derive(Serialize)]
pub struct RecordSyncResponse {
    pub entity: String,
    pub local_id: String,
    pub remote_id: Option<String>,
    pub version_token: Option<String>,
    pub last_synced_at: Option<String>,
}

impl From<&SyncedRecord> for RecordSyncResponse {
    fn from(record: &SyncedRecord) -> Self {
        Self {
            entity: record.entity.clone(),
            local_id: record.local_id.clone(),
            remote_id: record.remote_id.clone(),
            version_token: record.version_token.clone(),
            last_synced_at: record.last_synced_at.map(format_utc_rfc3339),
        }
    }
}

/// The caller's record, or 404 (also for another user's record).
async fn owned_record(
    state: &AppState,
    user: &AuthUser,
    entity: &str,
    local_id: &str,
) -> Result<SyncedRecord> {
    state
        .sync
        .records()
        .get_record(entity, local_id)
        .await?
        .filter(|r| r.user_id == user.user_id)
        .ok_or_else(|| AppError::NotFound(format!("{} {}", entity, local_id)))
}

// ─── Pull ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PullParams {
    /// Pull only this remote entity
    pub remote_id: Option<String>,
}

#[derive(Serialize)]
pub struct PullResponse {
    pub entity: String,
    pub pulled: usize,
}

async fn pull(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(entity): Path<String>,
    Query(params): Query<PullParams>,
) -> Result<Json<PullResponse>> {
    let adapter = state.registry.get(&entity)?;
    let pulled = state
        .sync
        .pull(adapter.as_ref(), &user.user_id, params.remote_id.as_deref())
        .await?;

    Ok(Json(PullResponse { entity, pulled }))
}

// ─── Push ────────────────────────────────────────────────────

async fn push_pending(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(entity): Path<String>,
) -> Result<Json<SyncReport>> {
    let adapter = state.registry.get(&entity)?;
    let report = state.sync.push_pending(adapter.as_ref(), &user.user_id).await?;
    Ok(Json(report))
}

async fn push_one(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((entity, local_id)): Path<(String, String)>,
) -> Result<Json<RecordSyncResponse>> {
    let adapter = state.registry.get(&entity)?;
    let record = owned_record(&state, &user, &entity, &local_id).await?;
    let record = state.sync.push(adapter.as_ref(), record).await?;
    Ok(Json(RecordSyncResponse::from(&record)))
}

// ─── Remote delete ───────────────────────────────────────────

async fn delete_remote(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path((entity, local_id)): Path<(String, String)>,
) -> Result<Json<RecordSyncResponse>> {
    let adapter = state.registry.get(&entity)?;
    let mut record = owned_record(&state, &user, &entity, &local_id).await?;
    state.sync.remote_delete(adapter.as_ref(), &mut record).await?;
    Ok(Json(RecordSyncResponse::from(&record)))
}
