//! Insight orchestration and query handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use tracing::info;

use tally_core::insights::ReceiptInsights;
use tally_core::models::{InsightItem, PriceHistory};
use tally_core::recurrence::RecurringGroup;

use crate::{AppError, AppState, MAX_PAGE_LIMIT};

/// POST /api/receipts/:id/insights - run (or re-run) the insight pipeline
///
/// Completed receipts come back with their stored items; pending and failed
/// receipts are processed.
pub async fn generate_insights(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ReceiptInsights>, AppError> {
    let insights = state.engine.generate_for_receipt(id).await?;
    info!(
        receipt_id = id,
        status = %insights.status,
        items = insights.items.len(),
        "Insight run finished"
    );
    Ok(Json(insights))
}

/// GET /api/receipts/:id/insights - stored insight items for a receipt
pub async fn get_receipt_insights(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<InsightItem>>, AppError> {
    state.db.require_receipt(id)?;
    let items = state.db.list_insight_items_for_receipt(id)?;
    Ok(Json(items))
}

#[derive(Deserialize)]
pub struct InsightItemsQuery {
    pub user_id: String,
    pub limit: Option<u32>,
}

/// GET /api/insights?user_id=&limit= - a user's insight items, newest first
pub async fn list_insight_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InsightItemsQuery>,
) -> Result<Json<Vec<InsightItem>>, AppError> {
    let limit = params.limit.unwrap_or(50).min(MAX_PAGE_LIMIT);
    let items = state.db.list_insight_items(&params.user_id, limit)?;
    Ok(Json(items))
}

/// GET /api/recurring/:user_id - recurring purchase groups over the trailing month
pub async fn list_recurring(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<RecurringGroup>>, AppError> {
    let groups = state.scanner.scan_user(&user_id)?;
    Ok(Json(groups))
}

#[derive(Deserialize)]
pub struct PriceHistoryQuery {
    pub user_id: String,
    pub item: String,
    pub days: Option<i64>,
}

/// GET /api/price-history?user_id=&item=&days= - price observations for an item
pub async fn get_price_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PriceHistoryQuery>,
) -> Result<Json<Vec<PriceHistory>>, AppError> {
    let days = params.days.unwrap_or(90).max(1);
    let history = state
        .db
        .list_price_history(&params.user_id, &params.item, days)?;
    Ok(Json(history))
}
