//! Weekly digest handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use tally_core::digest::DigestRunResults;
use tally_core::models::WeeklyDigest;

use crate::{AppError, AppState, SuccessResponse};

/// GET /api/users/:user_id/digests - a user's digests, newest week first
pub async fn list_digests(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<WeeklyDigest>>, AppError> {
    let digests = state.db.list_digests(&user_id)?;
    Ok(Json(digests))
}

/// GET /api/digests/:id - a single digest
pub async fn get_digest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<WeeklyDigest>, AppError> {
    let digest = state
        .db
        .get_digest(id)?
        .ok_or_else(|| AppError::not_found("Digest not found"))?;
    Ok(Json(digest))
}

/// POST /api/digests/:id/sent - mark a digest delivered
pub async fn mark_digest_sent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.mark_digest_sent(id)?;
    Ok(Json(SuccessResponse { success: true }))
}

/// POST /api/digests/run - run digest aggregation for all users now
///
/// Idempotent per user per week; users who already have this week's digest
/// are skipped.
pub async fn run_digests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DigestRunResults>, AppError> {
    let results = state.aggregator.run_for_all_users().await?;
    info!(
        processed = results.users_processed,
        created = results.digests_created,
        failed = results.users_failed,
        "Manual digest run finished"
    );
    Ok(Json(results))
}
