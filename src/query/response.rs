//! # Uniform Result Shape
//!
//! Every terminal operation (read, insert, update, delete, RPC, sign-in)
//! yields a [`QueryResponse`] `{data, error, count}`. Errors are carried,
//! not raised: check `error` before reading `data`.

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::errors::DataError;
use super::statement::Record;

/// `{data, error, count}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// A row list, a single row, a scalar, or null
    pub data: Value,

    #[serde(serialize_with = "serialize_error")]
    pub error: Option<DataError>,

    pub count: usize,
}

fn serialize_error<S: Serializer>(error: &Option<DataError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl QueryResponse {
    /// Successful row-list result
    pub fn rows(rows: Vec<Record>) -> Self {
        let count = rows.len();
        Self {
            data: Value::Array(rows.into_iter().map(Value::Object).collect()),
            error: None,
            count,
        }
    }

    /// Successful count-only result
    pub fn counted(count: usize) -> Self {
        Self {
            data: Value::Null,
            error: None,
            count,
        }
    }

    /// Successful scalar or object result
    pub fn value(data: Value, count: usize) -> Self {
        Self {
            data,
            error: None,
            count,
        }
    }

    /// Failed result
    pub fn failure(error: DataError) -> Self {
        Self {
            data: Value::Null,
            error: Some(error),
            count: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Narrow a row list to its first row, or null when empty.
    ///
    /// Non-list data and failures pass through unchanged.
    pub fn single(self) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.data {
            Value::Array(rows) => {
                let first = rows.into_iter().next();
                let count = usize::from(first.is_some());
                Self {
                    data: first.unwrap_or(Value::Null),
                    error: None,
                    count,
                }
            }
            other => Self { data: other, ..self },
        }
    }

    /// Rows as records; empty for failures and non-list data
    pub fn records(&self) -> Vec<Record> {
        match &self.data {
            Value::Array(rows) => rows
                .iter()
                .filter_map(|row| row.as_object().cloned())
                .collect(),
            Value::Object(row) => vec![row.clone()],
            _ => Vec::new(),
        }
    }

    /// Convert to a plain `Result` over the data
    pub fn into_result(self) -> Result<Value, DataError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.data),
        }
    }
}

impl From<DataError> for QueryResponse {
    fn from(error: DataError) -> Self {
        Self::failure(error)
    }
}
