//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tally_core::ai::AiClient;
use tally_core::db::Database;
use tower::ServiceExt;

fn setup_test_app() -> (Router, Database) {
    let db = Database::in_memory().unwrap();
    let app = create_router_with_ai(db.clone(), Some(AiClient::mock()), ServerConfig::default());
    (app, db)
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn sample_ingest_body(user_id: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "receipt": {
            "merchant": "Test Mart",
            "items": [
                { "name": "whole milk", "price": "3.50" },
                { "name": "bread", "price": "2,25", "quantity": 2.0 }
            ],
            "total_amount": "8.00",
            "currency": "USD"
        }
    })
}

// ========== Health ==========

#[tokio::test]
async fn test_health() {
    let (app, _db) = setup_test_app();

    let response = app.oneshot(get_request("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "ok");
}

// ========== Receipt API Tests ==========

#[tokio::test]
async fn test_ingest_receipt() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let json = get_body_json(response).await;
    assert_eq!(json["receipt"]["currency"], "USD");
    assert_eq!(json["receipt"]["insight_status"], "pending");
    assert_eq!(json["currency_needs_review"], false);
    assert_eq!(json["receipt"]["items"].as_array().unwrap().len(), 2);
    // Comma-decimal price parsed on the way in
    assert_eq!(json["receipt"]["items"][1]["price"], 2.25);
}

#[tokio::test]
async fn test_ingest_requires_user_id() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("  "),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_receipts() {
    let (app, _db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/api/receipts?user_id=user-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_receipt_not_found() {
    let (app, _db) = setup_test_app();

    let response = app.oneshot(get_request("/api/receipts/99999")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_receipt() {
    let (app, db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();
    let id = db.list_receipts("user-1").unwrap()[0].id;

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/receipts/{}?user_id=user-1", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(db.list_receipts("user-1").unwrap().is_empty());
}

#[tokio::test]
async fn test_correct_currency() {
    let (app, db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();
    let id = db.list_receipts("user-1").unwrap()[0].id;

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/currency", id),
            serde_json::json!({ "currency": "eur" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["currency"], "EUR");
    assert_eq!(json["currency_evidence"], "manually set");
}

// ========== Insight API Tests ==========

#[tokio::test]
async fn test_generate_insights() {
    let (app, db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();
    let id = db.list_receipts("user-1").unwrap()[0].id;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/insights", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["items"].as_array().unwrap().len(), 2);
    assert_eq!(json["items"][0]["category"], "groceries");

    // Stored items are readable afterwards
    let response = app
        .oneshot(get_request(&format!("/api/receipts/{}/insights", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_generate_insights_not_found() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/receipts/99999/insights",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_insight_items_empty() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(get_request("/api/insights?user_id=user-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_recurring_empty() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(get_request("/api/recurring/user-1"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert!(json.as_array().unwrap().is_empty());
}

// ========== Budget API Tests ==========

#[tokio::test]
async fn test_upsert_and_get_budget() {
    let (app, _db) = setup_test_app();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/api/budgets/user-1/categories",
            serde_json::json!({ "category": "Groceries", "monthly_limit": 400.0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["categories"].as_array().unwrap().len(), 1);
    assert_eq!(json["categories"][0]["monthly_limit"], 400.0);

    let response = app.oneshot(get_request("/api/budgets/user-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["notifications_enabled"], true);
    assert_eq!(json["categories"][0]["category"], "Groceries");
}

#[tokio::test]
async fn test_upsert_budget_rejects_nonpositive_limit() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "PUT",
            "/api/budgets/user-1/categories",
            serde_json::json!({ "category": "Dining", "monthly_limit": -5.0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_category_budget_not_found() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/budgets/user-1/categories/Dining")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_budget_analytics() {
    let (app, _db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "PUT",
            "/api/budgets/user-1/categories",
            serde_json::json!({ "category": "Groceries", "monthly_limit": 400.0 }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/api/budgets/user-1/analytics"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["categories"].as_array().unwrap().len(), 1);
    assert_eq!(json["categories"][0]["status"], "normal");
    assert_eq!(json["total_spent"], 0.0);
}

#[tokio::test]
async fn test_toggle_notifications() {
    let (app, db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/budgets/user-1/notifications",
            serde_json::json!({ "enabled": false }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let config = db.get_budget_config("user-1").unwrap().unwrap();
    assert!(!config.notifications_enabled);
}

// ========== Digest API Tests ==========

#[tokio::test]
async fn test_run_digests_empty() {
    let (app, _db) = setup_test_app();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/digests/run",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["users_processed"], 0);
    assert_eq!(json["digests_created"], 0);
}

#[tokio::test]
async fn test_run_digests_after_insights() {
    let (app, db) = setup_test_app();

    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/receipts",
            sample_ingest_body("user-1"),
        ))
        .await
        .unwrap();
    let id = db.list_receipts("user-1").unwrap()[0].id;
    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/receipts/{}/insights", id),
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/digests/run",
            serde_json::json!({}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["digests_created"], 1);

    let response = app
        .oneshot(get_request("/api/users/user-1/digests"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert!(json[0]["total_spend"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_get_digest_not_found() {
    let (app, _db) = setup_test_app();

    let response = app.oneshot(get_request("/api/digests/99999")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
