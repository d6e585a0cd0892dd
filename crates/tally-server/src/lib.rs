//! Tally Web Server
//!
//! Axum-based REST API for the Tally receipt insight pipeline.
//!
//! - Receipt ingestion from extraction output, with currency resolution
//! - Per-receipt insight orchestration (categorization, recurrence, budgets)
//! - Budget configuration, analytics, and manual resets
//! - Weekly digest retrieval and batch runs
//! - Background schedulers for digests and month rollover
//!
//! Responses are sanitized: internal errors are logged in full and returned
//! to the client as a generic message.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use tally_core::ai::{AiBackend, AiClient};
use tally_core::db::Database;
use tally_core::{BudgetLedger, DigestAggregator, InsightEngine, JobQueue, RecurrenceScanner};

mod handlers;
mod scheduler;

pub use scheduler::{start_schedulers, ScheduleConfig};

/// Maximum pagination limit
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub db: Database,
    pub ai: Option<AiClient>,
    pub jobs: JobQueue,
    pub ledger: BudgetLedger,
    pub engine: InsightEngine,
    pub aggregator: DigestAggregator,
    pub scanner: RecurrenceScanner,
}

/// Success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Create the application router
pub fn create_router(db: Database, config: ServerConfig) -> Router {
    // Create AI client if configured
    let ai = AiClient::from_env();
    if let Some(ref client) = ai {
        info!(
            "AI backend configured: {} (model: {})",
            client.host(),
            client.model()
        );
    } else {
        info!("AI backend not configured (set OLLAMA_HOST to enable AI features)");
    }
    create_router_with_ai(db, ai, config)
}

/// Create the application router with an explicit AI client (for testing)
pub fn create_router_with_ai(
    db: Database,
    ai: Option<AiClient>,
    config: ServerConfig,
) -> Router {
    let jobs = JobQueue::start_default();
    let ledger = BudgetLedger::new(db.clone(), jobs.clone());
    let engine = InsightEngine::new(db.clone(), ai.clone(), ledger.clone());
    let aggregator = DigestAggregator::new(db.clone(), ai.clone(), jobs.clone());
    let scanner = RecurrenceScanner::new(db.clone());

    let state = Arc::new(AppState {
        db,
        ai,
        jobs,
        ledger,
        engine,
        aggregator,
        scanner,
    });

    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Receipts
        .route(
            "/receipts",
            get(handlers::list_receipts).post(handlers::ingest_receipt),
        )
        .route(
            "/receipts/:id",
            get(handlers::get_receipt).delete(handlers::delete_receipt),
        )
        .route(
            "/receipts/:id/insights",
            get(handlers::get_receipt_insights).post(handlers::generate_insights),
        )
        .route("/receipts/:id/currency", post(handlers::correct_currency))
        // Insight items
        .route("/insights", get(handlers::list_insight_items))
        // Recurrence
        .route("/recurring/:user_id", get(handlers::list_recurring))
        // Price history
        .route("/price-history", get(handlers::get_price_history))
        // Budgets
        .route("/budgets/:user_id", get(handlers::get_budget_config))
        .route(
            "/budgets/:user_id/categories",
            put(handlers::upsert_category_budget),
        )
        .route(
            "/budgets/:user_id/categories/:category",
            delete(handlers::remove_category_budget),
        )
        .route("/budgets/:user_id/analytics", get(handlers::get_analytics))
        .route("/budgets/:user_id/reset", post(handlers::reset_budget))
        .route(
            "/budgets/:user_id/notifications",
            post(handlers::set_notifications),
        )
        // Digests
        .route("/digests/run", post(handlers::run_digests))
        .route("/digests/:id", get(handlers::get_digest))
        .route("/digests/:id/sent", post(handlers::mark_digest_sent))
        .route("/users/:user_id/digests", get(handlers::list_digests));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server
pub async fn serve(db: Database, host: &str, port: u16, config: ServerConfig) -> anyhow::Result<()> {
    // Check AI backend connection
    check_ai_connection().await;

    // Start background schedulers if configured
    if let Some(schedule) = ScheduleConfig::from_env() {
        let jobs = JobQueue::start_default();
        let ledger = BudgetLedger::new(db.clone(), jobs.clone());
        start_schedulers(db.clone(), AiClient::from_env(), jobs, ledger, schedule);
    }

    let app = create_router(db, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection() {
    match AiClient::from_env() {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "AI backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("AI backend not configured (set OLLAMA_HOST to enable AI features)");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<tally_core::Error> for AppError {
    fn from(err: tally_core::Error) -> Self {
        match err {
            tally_core::Error::NotFound(msg) => Self::not_found(&msg),
            tally_core::Error::InvalidData(msg) => Self::bad_request(&msg),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                // Return generic message to client
                message: "An internal error occurred".to_string(),
                // Keep full error for logging
                internal: Some(other.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests;
