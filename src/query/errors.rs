//! # Query Layer Errors
//!
//! Every terminal operation reports failures through [`DataError`],
//! carried inside the uniform response rather than raised.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Result type for query-layer operations
pub type DataResult<T> = Result<T, DataError>;

/// Query, mutation and session errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    // ==================
    // Validation (400)
    // ==================
    /// No table named in the request
    #[error("Missing table")]
    MissingTable,

    /// Update or delete without any usable predicate
    #[error("Missing filter for {operation}")]
    MissingFilter { operation: &'static str },

    /// Write without a payload
    #[error("Missing body for {operation}")]
    MissingBody { operation: &'static str },

    /// Payload present but not the expected shape
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Malformed reserved query parameter (`order`, `limit`)
    #[error("Invalid query parameter: {0}")]
    InvalidQueryParam(String),

    /// Table not in the schema registry
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Column not declared on the table
    #[error("Unknown column {column} on table {table}")]
    UnknownColumn { table: String, column: String },

    /// Value incompatible with the column type
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    // ==================
    // Auth (401)
    // ==================
    /// Sign-in lookup matched no record
    #[error("User not found")]
    AuthNotFound,

    /// Record matched but the password did not verify
    #[error("Invalid credentials")]
    InvalidCredentials,

    // ==================
    // Routing (404/405)
    // ==================
    /// Unknown procedure name
    #[error("RPC function not implemented: {0}")]
    RpcNotImplemented(String),

    /// HTTP method outside GET, POST, PATCH, DELETE
    #[error("Method {0} Not Allowed")]
    MethodNotAllowed(String),

    // ==================
    // Execution (5xx)
    // ==================
    /// Store-side failure, message preserved verbatim
    #[error("{0}")]
    QueryExecution(String),

    /// Batch insert aborted at `index`; rows before it stay committed
    #[error("Insert failed at row {index}: {source}")]
    RowFailed {
        index: usize,
        source: Box<DataError>,
    },

    /// Local session store could not be read or written
    #[error("Session store error: {0}")]
    Session(String),
}

impl DataError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            DataError::MissingTable
            | DataError::MissingFilter { .. }
            | DataError::MissingBody { .. }
            | DataError::InvalidBody(_)
            | DataError::InvalidQueryParam(_)
            | DataError::UnknownTable(_)
            | DataError::UnknownColumn { .. }
            | DataError::TypeMismatch(_) => StatusCode::BAD_REQUEST,

            DataError::AuthNotFound | DataError::InvalidCredentials => StatusCode::UNAUTHORIZED,

            DataError::RpcNotImplemented(_) => StatusCode::NOT_FOUND,
            DataError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,

            DataError::RowFailed { source, .. } => source.status_code(),

            DataError::QueryExecution(_) | DataError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the error was raised before any SQL ran
    pub fn is_validation(&self) -> bool {
        self.status_code() == StatusCode::BAD_REQUEST
    }
}

impl From<StoreError> for DataError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TypeMismatch(message) => DataError::TypeMismatch(message),
            other => DataError::QueryExecution(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
}

impl From<DataError> for ErrorResponse {
    fn from(err: DataError) -> Self {
        Self {
            code: err.status_code().as_u16(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for DataError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::from(self));
        (status, body).into_response()
    }
}
