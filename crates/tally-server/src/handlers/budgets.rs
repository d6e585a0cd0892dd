//! Budget configuration and analytics handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use tally_core::budget::BudgetAnalytics;
use tally_core::models::BudgetConfig;

use crate::{AppError, AppState, SuccessResponse};

/// GET /api/budgets/:user_id - the user's budget config (created lazily)
pub async fn get_budget_config(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BudgetConfig>, AppError> {
    let config = state.db.get_or_create_budget_config(&user_id)?;
    Ok(Json(config))
}

#[derive(Deserialize)]
pub struct UpsertCategoryBudgetRequest {
    pub category: String,
    pub monthly_limit: f64,
}

/// PUT /api/budgets/:user_id/categories - create or update a category budget
pub async fn upsert_category_budget(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<UpsertCategoryBudgetRequest>,
) -> Result<Json<BudgetConfig>, AppError> {
    if req.category.trim().is_empty() {
        return Err(AppError::bad_request("category is required"));
    }

    state
        .db
        .upsert_category_budget(&user_id, &req.category, req.monthly_limit)?;
    info!(
        user_id = %user_id,
        category = %req.category,
        limit = req.monthly_limit,
        "Category budget upserted"
    );

    let config = state.db.get_or_create_budget_config(&user_id)?;
    Ok(Json(config))
}

/// DELETE /api/budgets/:user_id/categories/:category - remove a category budget
pub async fn remove_category_budget(
    State(state): State<Arc<AppState>>,
    Path((user_id, category)): Path<(String, String)>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.remove_category_budget(&user_id, &category)?;
    info!(user_id = %user_id, category = %category, "Category budget removed");
    Ok(Json(SuccessResponse { success: true }))
}

/// GET /api/budgets/:user_id/analytics - per-category utilization
///
/// Sunday reads also dispatch the weekly summary notification when due.
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<BudgetAnalytics>, AppError> {
    let analytics = state.ledger.get_analytics(&user_id)?;
    Ok(Json(analytics))
}

/// POST /api/budgets/:user_id/reset - zero spends and re-arm thresholds
pub async fn reset_budget(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.ledger.reset_spending(&user_id)?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
pub struct NotificationsRequest {
    pub enabled: bool,
}

/// POST /api/budgets/:user_id/notifications - toggle threshold/summary alerts
pub async fn set_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<NotificationsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.set_notifications_enabled(&user_id, req.enabled)?;
    info!(user_id = %user_id, enabled = req.enabled, "Notifications toggled");
    Ok(Json(SuccessResponse { success: true }))
}
