//! REST Surface Tests
//!
//! Drives the axum router end to end over the in-memory backend:
//! - Insert, read, update and delete scenarios
//! - Validation errors map to 400 before any statement runs
//! - Store errors map to 500 with the message preserved
//! - Unsupported methods get 405 with an `Allow` header

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::DateTime;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use tabula::config::HttpConfig;
use tabula::http_server::build_router;
use tabula::query::{Client, ColumnDef, ColumnType, SchemaRegistry};
use tabula::store::MemoryBackend;

// =============================================================================
// Helper Functions
// =============================================================================

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_table(
            "products",
            vec![
                ColumnDef::new("id", ColumnType::Uuid).required(),
                ColumnDef::new("name", ColumnType::Text).required(),
                ColumnDef::new("sale_price", ColumnType::Numeric),
                ColumnDef::new("status", ColumnType::Text),
                ColumnDef::new("current_stock", ColumnType::Integer),
                ColumnDef::new("created_at", ColumnType::Timestamp),
                ColumnDef::new("updated_at", ColumnType::Timestamp),
            ],
        )
        .with_table(
            "audit_logs",
            vec![
                ColumnDef::new("id", ColumnType::Uuid).required(),
                ColumnDef::new("user_id", ColumnType::Text),
                ColumnDef::new("action", ColumnType::Text),
                ColumnDef::new("table_name", ColumnType::Text),
                ColumnDef::new("record_id", ColumnType::Text),
                ColumnDef::new("changes", ColumnType::Json),
                ColumnDef::new("created_at", ColumnType::Timestamp),
            ],
        )
}

fn setup() -> (Router, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new(registry()));
    let client = Client::new(backend.clone(), registry());
    (build_router(&HttpConfig::default(), client), backend)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, HeaderMap, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, json)
}

async fn seed(app: &Router) -> Vec<Value> {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/rest/v1/products",
        Some(json!([
            {"name": "Widget", "status": "ativo", "sale_price": 9.99, "current_stock": 3},
            {"name": "Gadget", "status": "inativo", "sale_price": 20, "current_stock": 0},
            {"name": "Gizmo", "status": "ativo", "sale_price": 4.5, "current_stock": 12},
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body.as_array().unwrap().clone()
}

// =============================================================================
// Scenarios
// =============================================================================

/// POST one object: generated uuid id, equal timestamps, object body.
#[tokio::test]
async fn test_scenario_a_insert_one() {
    let (app, backend) = setup();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/rest/v1/products",
        Some(json!({"name": "Widget", "sale_price": 9.99})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_object());

    let id = body["id"].as_str().unwrap();
    assert_eq!(id.len(), 36);
    assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 4);
    assert_eq!(body["sale_price"], json!(9.99));
    assert_eq!(body["created_at"], body["updated_at"]);
    assert!(DateTime::parse_from_rfc3339(body["created_at"].as_str().unwrap()).is_ok());

    assert_eq!(backend.row_count("products"), 1);
}

/// GET with a filter and a column list.
#[tokio::test]
async fn test_scenario_b_filtered_projection() {
    let (app, _) = setup();
    seed(&app).await;

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/rest/v1/products?status=eq.ativo&select=id,name",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        let keys: Vec<&String> = row.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
        assert!(row.get("id").is_some());
        assert!(row.get("name").is_some());
    }
    let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Widget", "Gizmo"]);
}

/// PATCH by id: one row back, stock set, updated_at moves forward.
#[tokio::test]
async fn test_scenario_c_update_by_id() {
    let (app, _) = setup();
    let rows = seed(&app).await;
    let id = rows[0]["id"].as_str().unwrap();
    let before = DateTime::parse_from_rfc3339(rows[0]["updated_at"].as_str().unwrap()).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;

    let (status, _, body) = send(
        &app,
        Method::PATCH,
        &format!("/rest/v1/products?id=eq.{}", id),
        Some(json!({"current_stock": 5})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let updated = body.as_array().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["current_stock"], json!(5));
    assert_eq!(updated[0]["created_at"], rows[0]["created_at"]);

    let after = DateTime::parse_from_rfc3339(updated[0]["updated_at"].as_str().unwrap()).unwrap();
    assert!(after > before);
}

/// DELETE without a filter is rejected and removes nothing.
#[tokio::test]
async fn test_scenario_d_unfiltered_delete() {
    let (app, backend) = setup();
    seed(&app).await;
    backend.reset_statement_count();

    let (status, _, body) = send(&app, Method::DELETE, "/rest/v1/products", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing filter for delete"));
    assert_eq!(body["code"], json!(400));
    assert_eq!(backend.row_count("products"), 3);
    assert_eq!(backend.executed_statements(), 0);
}

// =============================================================================
// Read Surface
// =============================================================================

#[tokio::test]
async fn test_order_and_limit() {
    let (app, _) = setup();
    seed(&app).await;

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/rest/v1/products?select=name&order=sale_price.desc&limit=2",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"name": "Gadget"}, {"name": "Widget"}]));
}

#[tokio::test]
async fn test_numeric_filters_from_query_string() {
    let (app, _) = setup();
    seed(&app).await;

    let (_, _, body) = send(
        &app,
        Method::GET,
        "/rest/v1/products?select=name&current_stock=gte.3&sale_price=gte.5",
        None,
    )
    .await;
    assert_eq!(body, json!([{"name": "Widget"}]));

    let (_, _, body) = send(
        &app,
        Method::GET,
        "/rest/v1/products?select=name&status=not_eq.ativo",
        None,
    )
    .await;
    assert_eq!(body, json!([{"name": "Gadget"}]));
}

/// Unknown operators are dropped and do not narrow the read.
#[tokio::test]
async fn test_unknown_operator_is_ignored() {
    let (app, _) = setup();
    seed(&app).await;

    let (status, _, body) = send(&app, Method::GET, "/rest/v1/products?status=like.at", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_read_validation_errors() {
    let (app, backend) = setup();
    seed(&app).await;
    backend.reset_statement_count();

    let cases = [
        ("/rest/v1/", "Missing table"),
        ("/rest/v1/ghosts", "Unknown table: ghosts"),
        ("/rest/v1/products?colour=eq.red", "Unknown column colour on table products"),
        ("/rest/v1/products?select=id,colour", "Unknown column colour on table products"),
        ("/rest/v1/products?limit=many", "Invalid query parameter: Invalid limit: many"),
    ];
    for (uri, message) in cases {
        let (status, _, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], json!(message), "{}", uri);
    }

    let (status, _, body) = send(&app, Method::GET, "/rest/v1/products?current_stock=eq.lots", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("Type mismatch"));

    assert_eq!(backend.executed_statements(), 0);
}

// =============================================================================
// Write Surface
// =============================================================================

#[tokio::test]
async fn test_insert_many_returns_array() {
    let (app, _) = setup();
    let rows = seed(&app).await;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2]["name"], json!("Gizmo"));
}

#[tokio::test]
async fn test_insert_body_errors() {
    let (app, backend) = setup();

    let (status, _, body) = send(&app, Method::POST, "/rest/v1/products", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing body for insert"));

    let (status, _, _) = send(&app, Method::POST, "/rest/v1/products", Some(json!(42))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(backend.executed_statements(), 0);
}

/// Store-side failures surface as 500 with the store's message.
#[tokio::test]
async fn test_execution_error_is_500() {
    let (app, _) = setup();
    let rows = seed(&app).await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/rest/v1/products",
        Some(json!({"id": rows[0]["id"], "name": "Clone"})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], json!(500));
    assert!(body["error"].as_str().unwrap().contains("duplicate key"));
}

#[tokio::test]
async fn test_update_requires_filter_and_body() {
    let (app, backend) = setup();
    let rows = seed(&app).await;
    backend.reset_statement_count();

    let (status, _, body) = send(
        &app,
        Method::PATCH,
        "/rest/v1/products?select=*",
        Some(json!({"current_stock": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing filter for update"));

    let uri = format!("/rest/v1/products?id=eq.{}", rows[0]["id"].as_str().unwrap());
    let (status, _, body) = send(&app, Method::PATCH, &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Missing body for update"));

    assert_eq!(backend.executed_statements(), 0);
}

#[tokio::test]
async fn test_delete_returns_removed_rows() {
    let (app, backend) = setup();
    seed(&app).await;

    let (status, _, body) = send(&app, Method::DELETE, "/rest/v1/products?status=eq.ativo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(backend.row_count("products"), 1);

    let (status, _, body) = send(&app, Method::DELETE, "/rest/v1/products?status=eq.ativo", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_unsupported_method() {
    let (app, _) = setup();

    let (status, headers, body) = send(&app, Method::PUT, "/rest/v1/products", Some(json!({}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers[header::ALLOW], "GET,POST,PATCH,DELETE");
    assert_eq!(body["error"], json!("Method PUT Not Allowed"));
}

// =============================================================================
// RPC and Health
// =============================================================================

#[tokio::test]
async fn test_rpc_log_audit_event() {
    let (app, backend) = setup();

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/rest/v1/rpc/log_audit_event",
        Some(json!({
            "p_user_id": "u-1",
            "p_action": "UPDATE",
            "p_table_name": "products",
            "p_record_id": "r-1",
            "p_changes": {"current_stock": 5},
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], Value::Null);
    assert_eq!(body["count"], json!(1));

    let logged = backend.rows("audit_logs");
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0]["id"], body["data"]);
    assert_eq!(logged[0]["changes"], json!({"current_stock": 5}));
}

#[tokio::test]
async fn test_rpc_unknown_function() {
    let (app, _) = setup();

    let (status, _, body) = send(&app, Method::POST, "/rest/v1/rpc/drop_everything", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"], json!("RPC function not implemented: drop_everything"));
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup();
    let (status, _, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}
