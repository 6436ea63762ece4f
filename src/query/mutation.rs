//! # Mutation Engine
//!
//! Inserts, filtered updates and filtered deletes.
//!
//! ## Batch inserts are not atomic
//!
//! Rows are inserted one statement at a time, in input order. If row `k`
//! fails, rows `0..k` stay committed, rows after `k` are never attempted,
//! and the response carries [`DataError::RowFailed`] with `index = k`.
//! Its `data` still lists the rows that were committed.
//!
//! ## Write scope
//!
//! Updates and deletes need at least one predicate with a recognized
//! operator. Without one the request fails with `MissingFilter` before any
//! statement is built.

use std::future::IntoFuture;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::observability::Logger;

use super::builder::FilterBuilder;
use super::client::ClientInner;
use super::errors::{DataError, DataResult};
use super::filter::Predicate;
use super::response::QueryResponse;
use super::schema::{
    clamp_updated_at, format_timestamp, ColumnType, TableSchema, CREATED_AT, UPDATED_AT,
};
use super::statement::{Record, Statement};

const ID: &str = "id";

/// Split an insert payload into rows.
///
/// An object is one row, an array of objects is many; anything else is
/// rejected.
pub fn rows_from_value(value: Value) -> DataResult<Vec<Record>> {
    match value {
        Value::Object(row) => Ok(vec![row]),
        Value::Array(items) if items.is_empty() => Err(DataError::MissingBody { operation: "insert" }),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                _ => Err(DataError::InvalidBody(format!("row {} is not an object", index))),
            })
            .collect(),
        Value::Null => Err(DataError::MissingBody { operation: "insert" }),
        _ => Err(DataError::InvalidBody("expected an object or an array of objects".to_string())),
    }
}

fn is_absent(row: &Record, column: &str) -> bool {
    row.get(column).map_or(true, Value::is_null)
}

/// Fill `id`, `created_at` and `updated_at` where the table declares them
/// and the row leaves them out.
///
/// `updated_at` never precedes `created_at`, whoever supplied either.
fn with_system_columns(table: &TableSchema, mut row: Record, now: DateTime<Utc>) -> Record {
    if let Some(id) = table.column(ID) {
        if matches!(id.column_type, ColumnType::Uuid | ColumnType::Text) && is_absent(&row, ID) {
            row.insert(ID.to_string(), Value::String(Uuid::new_v4().to_string()));
        }
    }

    if table.has_column(CREATED_AT) && is_absent(&row, CREATED_AT) {
        row.insert(CREATED_AT.to_string(), Value::String(format_timestamp(&now)));
    }

    if table.has_column(UPDATED_AT) && is_absent(&row, UPDATED_AT) {
        row.insert(UPDATED_AT.to_string(), Value::String(format_timestamp(&now)));
    }
    clamp_updated_at(&mut row);

    row
}

/// Executes mutations for one client
pub struct MutationEngine<'a> {
    client: &'a ClientInner,
}

impl<'a> MutationEngine<'a> {
    pub(crate) fn new(client: &'a ClientInner) -> Self {
        Self { client }
    }

    /// Insert rows sequentially; see the module docs for the failure policy
    pub async fn insert(&self, table: &str, rows: Vec<Record>) -> QueryResponse {
        let planner = self.client.planner();
        let schema = match planner.target(table) {
            Ok(schema) => schema,
            Err(err) => return QueryResponse::failure(err),
        };
        if rows.is_empty() {
            return QueryResponse::failure(DataError::MissingBody { operation: "insert" });
        }

        let batch = rows.len() > 1;
        let now = Utc::now();
        let mut inserted = Vec::with_capacity(rows.len());

        for (index, row) in rows.into_iter().enumerate() {
            let row = with_system_columns(schema, row, now);
            let result = match planner.insert(table, &row) {
                Ok(statement) => self.client.execute(&statement).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(mut returned) => inserted.append(&mut returned),
                Err(source) => {
                    Logger::error(
                        "INSERT_ROW_FAILED",
                        &[
                            ("committed", &inserted.len().to_string()),
                            ("error", &source.to_string()),
                            ("index", &index.to_string()),
                            ("table", table),
                        ],
                    );
                    let error = if batch {
                        DataError::RowFailed {
                            index,
                            source: Box::new(source),
                        }
                    } else {
                        source
                    };
                    let mut response = QueryResponse::rows(inserted);
                    response.error = Some(error);
                    return response;
                }
            }
        }

        QueryResponse::rows(inserted)
    }

    /// Update matching rows, refreshing `updated_at`
    pub async fn update(&self, table: &str, predicates: &[Predicate], patch: Value) -> QueryResponse {
        let (patch, malformed) = match patch {
            Value::Object(patch) => (patch, false),
            Value::Null => (Record::new(), false),
            _ => (Record::new(), true),
        };

        let stamp = format_timestamp(&Utc::now());
        let statement = self
            .client
            .planner()
            .update(table, predicates, &patch, Some(&stamp))
            .map_err(|err| match err {
                DataError::MissingBody { .. } if malformed => {
                    DataError::InvalidBody("update body must be an object".to_string())
                }
                other => other,
            });

        self.run(statement).await
    }

    /// Delete matching rows
    pub async fn delete(&self, table: &str, predicates: &[Predicate]) -> QueryResponse {
        let statement = self.client.planner().delete(table, predicates);
        self.run(statement).await
    }

    async fn run(&self, statement: DataResult<Statement>) -> QueryResponse {
        let result = match statement {
            Ok(statement) => self.client.execute(&statement).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(rows) => QueryResponse::rows(rows),
            Err(err) => QueryResponse::failure(err),
        }
    }
}

/// Pending insert; executes when awaited
pub struct InsertRequest {
    client: Arc<ClientInner>,
    table: String,
    rows: DataResult<Vec<Record>>,
}

impl InsertRequest {
    pub(crate) fn new(client: Arc<ClientInner>, table: String, rows: DataResult<Vec<Record>>) -> Self {
        Self { client, table, rows }
    }
}

impl IntoFuture for InsertRequest {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'static, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            match self.rows {
                Ok(rows) => MutationEngine::new(&self.client).insert(&self.table, rows).await,
                Err(err) => QueryResponse::failure(err),
            }
        })
    }
}

/// Pending update; add filters, then await
pub struct UpdateBuilder {
    client: Arc<ClientInner>,
    table: String,
    patch: Value,
    predicates: Vec<Predicate>,
}

impl UpdateBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, table: String, patch: Value) -> Self {
        Self {
            client,
            table,
            patch,
            predicates: Vec::new(),
        }
    }
}

impl FilterBuilder for UpdateBuilder {
    fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }
}

impl IntoFuture for UpdateBuilder {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'static, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            MutationEngine::new(&self.client)
                .update(&self.table, &self.predicates, self.patch)
                .await
        })
    }
}

/// Pending delete; add filters, then await
pub struct DeleteBuilder {
    client: Arc<ClientInner>,
    table: String,
    predicates: Vec<Predicate>,
}

impl DeleteBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, table: String) -> Self {
        Self {
            client,
            table,
            predicates: Vec::new(),
        }
    }
}

impl FilterBuilder for DeleteBuilder {
    fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }
}

impl IntoFuture for DeleteBuilder {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'static, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            MutationEngine::new(&self.client)
                .delete(&self.table, &self.predicates)
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::client::Client;
    use crate::query::schema::{ColumnDef, SchemaRegistry};
    use crate::store::MemoryBackend;
    use serde_json::json;

    fn products() -> TableSchema {
        TableSchema::new(vec![
            ColumnDef::new("id", ColumnType::Uuid).required(),
            ColumnDef::new("name", ColumnType::Text).required(),
            ColumnDef::new("current_stock", ColumnType::Integer),
            ColumnDef::new("created_at", ColumnType::Timestamp),
            ColumnDef::new("updated_at", ColumnType::Timestamp),
        ])
    }

    fn client() -> (Client, Arc<MemoryBackend>) {
        let mut registry = SchemaRegistry::new();
        registry.insert_table("products", products());
        registry.insert_table(
            "tags",
            TableSchema::new(vec![ColumnDef::new("label", ColumnType::Text)]),
        );
        let backend = Arc::new(MemoryBackend::new(registry.clone()));
        (Client::new(backend.clone(), registry), backend)
    }

    #[test]
    fn test_rows_from_value() {
        assert_eq!(rows_from_value(json!({"a": 1})).unwrap().len(), 1);
        assert_eq!(rows_from_value(json!([{"a": 1}, {"a": 2}])).unwrap().len(), 2);
        assert_eq!(
            rows_from_value(Value::Null),
            Err(DataError::MissingBody { operation: "insert" })
        );
        assert!(matches!(rows_from_value(json!([{"a": 1}, 3])), Err(DataError::InvalidBody(_))));
        assert!(matches!(rows_from_value(json!("row")), Err(DataError::InvalidBody(_))));
    }

    #[test]
    fn test_system_columns_filled() {
        let now = Utc::now();
        let row = with_system_columns(&products(), Record::new(), now);

        let id = row["id"].as_str().unwrap();
        assert_eq!(Uuid::parse_str(id).unwrap().get_version_num(), 4);
        assert_eq!(row["created_at"], row["updated_at"]);
    }

    #[test]
    fn test_system_columns_respect_caller_and_table() {
        let now = Utc::now();
        let mut row = Record::new();
        row.insert("id".to_string(), json!("1b4e28ba-2fa1-41d2-883f-0016d3cca427"));
        row.insert("created_at".to_string(), json!("2999-01-01T00:00:00.000Z"));
        let row = with_system_columns(&products(), row, now);

        assert_eq!(row["id"], json!("1b4e28ba-2fa1-41d2-883f-0016d3cca427"));
        assert_eq!(row["updated_at"], json!("2999-01-01T00:00:00.000Z"));

        let mut row = Record::new();
        row.insert("created_at".to_string(), json!("2024-06-01T00:00:00Z"));
        row.insert("updated_at".to_string(), json!("2024-01-01T00:00:00Z"));
        let row = with_system_columns(&products(), row, now);
        assert_eq!(row["updated_at"], json!("2024-06-01T00:00:00.000Z"));

        let tags = TableSchema::new(vec![ColumnDef::new("label", ColumnType::Text)]);
        assert!(with_system_columns(&tags, Record::new(), now).is_empty());
    }

    #[tokio::test]
    async fn test_insert_returns_rows_in_order() {
        let (client, _) = client();
        let response = client
            .from("products")
            .insert(json!([{"name": "a"}, {"name": "b"}, {"name": "c"}]))
            .await;

        assert!(response.is_ok());
        let names: Vec<_> = response.records().iter().map(|r| r["name"].clone()).collect();
        assert_eq!(names, vec![json!("a"), json!("b"), json!("c")]);
    }

    #[tokio::test]
    async fn test_batch_failure_keeps_prefix() {
        let (client, backend) = client();
        let response = client
            .from("products")
            .insert(json!([{"name": "a"}, {"name": "b"}, {"current_stock": 1}, {"name": "d"}]))
            .await;

        match &response.error {
            Some(DataError::RowFailed { index, .. }) => assert_eq!(*index, 2),
            other => panic!("expected RowFailed, got {:?}", other),
        }
        assert_eq!(response.count, 2);
        assert_eq!(backend.row_count("products"), 2);
        assert_eq!(backend.executed_statements(), 3);
    }

    #[tokio::test]
    async fn test_validation_failure_mid_batch_reports_index() {
        let (client, backend) = client();
        let response = client
            .from("products")
            .insert(json!([{"name": "a"}, {"name": "b", "current_stock": "many"}]))
            .await;

        match response.error {
            Some(DataError::RowFailed { index, source }) => {
                assert_eq!(index, 1);
                assert!(matches!(*source, DataError::TypeMismatch(_)));
            }
            other => panic!("expected RowFailed, got {:?}", other),
        }
        assert_eq!(backend.row_count("products"), 1);
    }

    #[tokio::test]
    async fn test_single_row_failure_is_unwrapped() {
        let (client, _) = client();
        let response = client.from("products").insert(json!({"current_stock": 1})).await;
        assert!(matches!(response.error, Some(DataError::QueryExecution(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete_require_filter() {
        let (client, backend) = client();
        client.from("products").insert(json!({"name": "a"})).await;
        backend.reset_statement_count();

        let response = client.from("products").update(json!({"name": "b"})).await;
        assert_eq!(response.error, Some(DataError::MissingFilter { operation: "update" }));

        let response = client
            .from("products")
            .delete()
            .filter("name", "ilike", "a")
            .await;
        assert_eq!(response.error, Some(DataError::MissingFilter { operation: "delete" }));

        assert_eq!(backend.executed_statements(), 0);
        assert_eq!(backend.row_count("products"), 1);
    }

    #[tokio::test]
    async fn test_update_body_checks() {
        let (client, _) = client();
        let response = client.from("products").update(json!({})).eq("name", "a").await;
        assert_eq!(response.error, Some(DataError::MissingBody { operation: "update" }));

        let response = client.from("products").update(json!([1])).eq("name", "a").await;
        assert!(matches!(response.error, Some(DataError::InvalidBody(_))));
    }

    #[tokio::test]
    async fn test_update_refreshes_updated_at() {
        let (client, _) = client();
        let created = client
            .from("products")
            .insert(json!({"name": "a", "current_stock": 1}))
            .await
            .single();
        let id = created.data["id"].as_str().unwrap().to_string();
        let before = created.data["updated_at"].as_str().unwrap().to_string();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let updated = client
            .from("products")
            .update(json!({"current_stock": 5}))
            .eq("id", id.as_str())
            .await;
        assert_eq!(updated.count, 1);
        let row = &updated.records()[0];
        assert_eq!(row["current_stock"], json!(5));
        assert!(row["updated_at"].as_str().unwrap() > before.as_str());
        assert_eq!(row["created_at"], created.data["created_at"]);
    }

    #[tokio::test]
    async fn test_delete_returns_removed_rows() {
        let (client, backend) = client();
        client
            .from("products")
            .insert(json!([{"name": "a", "current_stock": 1}, {"name": "b", "current_stock": 7}]))
            .await;

        let removed = client.from("products").delete().lte("current_stock", 5).await;
        assert_eq!(removed.count, 1);
        assert_eq!(removed.records()[0]["name"], json!("a"));
        assert_eq!(backend.row_count("products"), 1);
    }
}
