//! Named procedure calls
//!
//! Only `log_audit_event` exists. It records one row in the audit table
//! (`audit_logs` unless configured otherwise) and returns the new row's id.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::client::ClientInner;
use super::errors::{DataError, DataResult};
use super::response::QueryResponse;
use super::schema::format_timestamp;
use super::statement::Record;

pub const LOG_AUDIT_EVENT: &str = "log_audit_event";

/// Parameter name to audit column
const AUDIT_COLUMNS: [(&str, &str); 5] = [
    ("p_user_id", "user_id"),
    ("p_action", "action"),
    ("p_table_name", "table_name"),
    ("p_record_id", "record_id"),
    ("p_changes", "changes"),
];

pub(crate) async fn call(client: &ClientInner, name: &str, params: &Value) -> QueryResponse {
    let result = match name {
        LOG_AUDIT_EVENT => log_audit_event(client, params).await,
        other => Err(DataError::RpcNotImplemented(other.to_string())),
    };
    match result {
        Ok(id) => QueryResponse::value(id, 1),
        Err(err) => QueryResponse::failure(err),
    }
}

async fn log_audit_event(client: &ClientInner, params: &Value) -> DataResult<Value> {
    let table = client.options.audit_table.as_str();
    let schema = client.planner().target(table)?;

    let id = Uuid::new_v4().to_string();
    let mut row = Record::new();
    row.insert("id".to_string(), Value::String(id.clone()));
    for (param, column) in AUDIT_COLUMNS {
        let value = params.get(param).cloned().unwrap_or(Value::Null);
        row.insert(column.to_string(), value);
    }
    if schema.has_column("created_at") {
        row.insert(
            "created_at".to_string(),
            Value::String(format_timestamp(&Utc::now())),
        );
    }

    let statement = client.planner().insert(table, &row)?;
    client.execute(&statement).await?;
    Ok(Value::String(id))
}
