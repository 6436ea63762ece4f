//! REST HTTP Routes
//!
//! Table-agnostic endpoints over the query layer:
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | GET | `/rest/v1/:table` | select; array of rows |
//! | POST | `/rest/v1/:table` | insert; object for one row, else array |
//! | PATCH | `/rest/v1/:table` | update by filter; array |
//! | DELETE | `/rest/v1/:table` | delete by filter; array |
//! | POST | `/rest/v1/rpc/:function` | procedure call; `{data, error, count}` |

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use serde_json::Value;

use crate::observability::Logger;
use crate::query::{Client, DataError, DataResult, FilterBuilder, QueryResponse};

use super::params::RequestParams;

/// Value of the `Allow` header on 405 responses
pub const ALLOWED_METHODS: &str = "GET,POST,PATCH,DELETE";

// ==================
// Shared State
// ==================

/// REST state shared across handlers
pub struct RestState {
    pub client: Client,
}

impl RestState {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Create REST routes
pub fn rest_routes(state: Arc<RestState>) -> Router {
    Router::new()
        .route("/rest/v1", any(missing_table_handler))
        .route("/rest/v1/", any(missing_table_handler))
        .route("/rest/v1/rpc/:function", post(rpc_handler))
        .route("/rest/v1/:table", any(table_handler))
        .with_state(state)
}

// ==================
// Handlers
// ==================

async fn missing_table_handler(method: Method) -> Response {
    failure(&method, "", DataError::MissingTable)
}

async fn table_handler(
    State(state): State<Arc<RestState>>,
    method: Method,
    Path(table): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Response {
    match dispatch(&state.client, &method, &table, pairs, &body).await {
        Ok(data) => (StatusCode::OK, Json(data)).into_response(),
        Err(err) => failure(&method, &table, err),
    }
}

async fn rpc_handler(
    State(state): State<Arc<RestState>>,
    Path(function): Path<String>,
    body: Bytes,
) -> Response {
    let response = match parse_body(&body) {
        Ok(params) => state.client.rpc(&function, params).await,
        Err(err) => QueryResponse::failure(err),
    };

    let status = match &response.error {
        Some(err) => {
            log_failure(&Method::POST, &function, err);
            err.status_code()
        }
        None => StatusCode::OK,
    };
    (status, Json(response)).into_response()
}

/// Run one table request and shape its data for the response body
async fn dispatch(
    client: &Client,
    method: &Method,
    table: &str,
    pairs: Vec<(String, String)>,
    body: &Bytes,
) -> DataResult<Value> {
    if table.trim().is_empty() {
        return Err(DataError::MissingTable);
    }

    let response = match *method {
        Method::GET => {
            let params = RequestParams::parse(method, pairs)?;
            let mut builder = client.from(table).select(&params.select);
            for (column, raw) in &params.filters {
                builder = builder.filter_raw(column, raw.as_str());
            }
            if let Some((column, ascending)) = &params.order {
                builder = builder.order(column, *ascending);
            }
            if let Some(limit) = params.limit {
                builder = builder.limit(limit);
            }
            builder.await
        }
        Method::POST => {
            let rows = parse_body(body)?;
            let response = client.from(table).insert(rows).await;
            if response.is_ok() && response.count == 1 {
                response.single()
            } else {
                response
            }
        }
        Method::PATCH => {
            let params = RequestParams::parse(method, pairs)?;
            let patch = parse_body(body)?;
            let mut builder = client.from(table).update(patch);
            for (column, raw) in &params.filters {
                builder = builder.filter_raw(column, raw.as_str());
            }
            builder.await
        }
        Method::DELETE => {
            let params = RequestParams::parse(method, pairs)?;
            let mut builder = client.from(table).delete();
            for (column, raw) in &params.filters {
                builder = builder.filter_raw(column, raw.as_str());
            }
            builder.await
        }
        _ => return Err(DataError::MethodNotAllowed(method.to_string())),
    };

    response.into_result()
}

/// Empty body reads as null; anything else must be JSON
fn parse_body(body: &Bytes) -> DataResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| DataError::InvalidBody(e.to_string()))
}

fn failure(method: &Method, table: &str, err: DataError) -> Response {
    log_failure(method, table, &err);

    let not_allowed = matches!(err, DataError::MethodNotAllowed(_));
    let mut response = err.into_response();
    if not_allowed {
        response
            .headers_mut()
            .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    }
    response
}

fn log_failure(method: &Method, target: &str, err: &DataError) {
    let status = err.status_code();
    if status.is_server_error() {
        Logger::error(
            "REQUEST_FAILED",
            &[
                ("error", &err.to_string()),
                ("method", method.as_str()),
                ("status", status.as_str()),
                ("target", target),
            ],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(&Bytes::new()).unwrap(), Value::Null);
        assert_eq!(parse_body(&Bytes::from_static(b" \n")).unwrap(), Value::Null);
        assert_eq!(
            parse_body(&Bytes::from_static(b"{\"a\":1}")).unwrap(),
            serde_json::json!({"a": 1})
        );
        assert!(matches!(
            parse_body(&Bytes::from_static(b"{oops")),
            Err(DataError::InvalidBody(_))
        ));
    }

    #[test]
    fn test_method_not_allowed_carries_allow_header() {
        let response = failure(&Method::PUT, "products", DataError::MethodNotAllowed("PUT".into()));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], ALLOWED_METHODS);
    }
}
