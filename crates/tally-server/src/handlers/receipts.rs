//! Receipt ingestion, retrieval, and currency correction handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use tally_core::currency::resolve_currency;
use tally_core::models::{ExtractedReceipt, Receipt};

use crate::{AppError, AppState, SuccessResponse};

/// Body for receipt ingestion: the raw extraction output plus the owner
#[derive(Deserialize)]
pub struct IngestReceiptRequest {
    pub user_id: String,
    pub receipt: ExtractedReceipt,
}

#[derive(Serialize)]
pub struct IngestReceiptResponse {
    pub receipt: Receipt,
    /// Whether the currency decision should be surfaced for user review
    pub currency_needs_review: bool,
}

/// POST /api/receipts - store an extracted receipt
pub async fn ingest_receipt(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestReceiptRequest>,
) -> Result<Json<IngestReceiptResponse>, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::bad_request("user_id is required"));
    }

    let resolution = resolve_currency(&req.receipt);
    let receipt_id = state.db.create_receipt(&req.user_id, &req.receipt, &resolution)?;
    let receipt = state.db.require_receipt(receipt_id)?;

    info!(
        receipt_id = receipt_id,
        user_id = %req.user_id,
        currency = %receipt.currency,
        confidence = receipt.currency_confidence,
        "Receipt ingested"
    );

    Ok(Json(IngestReceiptResponse {
        currency_needs_review: receipt.currency_needs_review(),
        receipt,
    }))
}

#[derive(Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

/// GET /api/receipts?user_id= - list a user's receipts, newest first
pub async fn list_receipts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserQuery>,
) -> Result<Json<Vec<Receipt>>, AppError> {
    let receipts = state.db.list_receipts(&params.user_id)?;
    Ok(Json(receipts))
}

/// GET /api/receipts/:id - get a single receipt
pub async fn get_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Receipt>, AppError> {
    let receipt = state.db.require_receipt(id)?;
    Ok(Json(receipt))
}

/// DELETE /api/receipts/:id?user_id= - delete a receipt and its insight items
pub async fn delete_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(params): Query<UserQuery>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_receipt(id, &params.user_id)?;
    info!(receipt_id = id, user_id = %params.user_id, "Receipt deleted");
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Deserialize)]
pub struct CorrectCurrencyRequest {
    pub currency: String,
}

/// POST /api/receipts/:id/currency - user override of the resolved currency
pub async fn correct_currency(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CorrectCurrencyRequest>,
) -> Result<Json<Receipt>, AppError> {
    if req.currency.trim().is_empty() {
        return Err(AppError::bad_request("currency is required"));
    }

    // 404 before update so a bad id doesn't look like success
    state.db.require_receipt(id)?;
    state.db.correct_currency(id, &req.currency)?;

    let receipt = state.db.require_receipt(id)?;
    info!(receipt_id = id, currency = %receipt.currency, "Currency corrected");
    Ok(Json(receipt))
}
