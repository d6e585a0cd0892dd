//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod budgets;
pub mod digests;
pub mod insights;
pub mod receipts;

// Re-export all handlers for use in router
pub use budgets::*;
pub use digests::*;
pub use insights::*;
pub use receipts::*;

use axum::Json;

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
