//! # Client
//!
//! The entry point of the query layer. A `Client` owns an injected
//! [`Backend`] and the [`SchemaRegistry`] used as the identifier
//! allow-list; there is no process-wide pool.
//!
//! ```ignore
//! let client = Client::new(backend, registry);
//!
//! let active = client
//!     .from("products")
//!     .select("id,name")
//!     .eq("status", "ativo")
//!     .order("name", true)
//!     .await;
//!
//! let created = client
//!     .from("products")
//!     .insert(json!({"name": "Widget", "sale_price": 9.99}))
//!     .await
//!     .single();
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::config::PoolConfig;
use crate::observability::{Logger, Severity};
use crate::store::{Backend, PgBackend};

use super::builder::QueryBuilder;
use super::errors::DataResult;
use super::mutation::{rows_from_value, DeleteBuilder, InsertRequest, UpdateBuilder};
use super::plan::Planner;
use super::response::QueryResponse;
use super::rpc;
use super::schema::SchemaRegistry;
use super::statement::{Record, Statement};

/// Client options beyond the backend and registry
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Table written by the `log_audit_event` procedure
    pub audit_table: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            audit_table: "audit_logs".to_string(),
        }
    }
}

pub(crate) struct ClientInner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) registry: SchemaRegistry,
    pub(crate) options: ClientOptions,
}

impl ClientInner {
    pub(crate) fn planner(&self) -> Planner<'_> {
        Planner::new(&self.registry)
    }

    /// Run one statement on the backend
    pub(crate) async fn execute(&self, statement: &Statement) -> DataResult<Vec<Record>> {
        let rows = self.backend.execute(statement).await?;
        if Logger::enabled(Severity::Trace) {
            Logger::trace(
                "QUERY_EXECUTED",
                &[
                    ("backend", self.backend.name()),
                    ("kind", statement.kind()),
                    ("rows", &rows.len().to_string()),
                    ("table", statement.table()),
                ],
            );
        }
        Ok(rows)
    }
}

/// Query-layer handle; cheap to clone
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(backend: Arc<dyn Backend>, registry: SchemaRegistry) -> Self {
        Self::with_options(backend, registry, ClientOptions::default())
    }

    pub fn with_options(
        backend: Arc<dyn Backend>,
        registry: SchemaRegistry,
        options: ClientOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend,
                registry,
                options,
            }),
        }
    }

    /// Open a PostgreSQL pool and load the registry from `schema`
    pub async fn connect(
        database_url: &str,
        pool: &PoolConfig,
        schema: &str,
        options: ClientOptions,
    ) -> DataResult<Self> {
        let backend = PgBackend::connect(database_url, pool).await?;
        let registry = match SchemaRegistry::introspect(&backend, schema).await {
            Ok(registry) => registry,
            Err(err) => {
                backend.close().await;
                return Err(err.into());
            }
        };
        Ok(Self::with_options(Arc::new(backend), registry, options))
    }

    /// Start a request against `table`
    pub fn from(&self, table: impl Into<String>) -> TableRef {
        TableRef {
            client: Arc::clone(&self.inner),
            table: table.into(),
        }
    }

    /// Call a named procedure
    pub async fn rpc(&self, name: &str, params: Value) -> QueryResponse {
        rpc::call(&self.inner, name, &params).await
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// Close the backend's connections
    pub async fn close(&self) {
        self.inner.backend.close().await;
    }
}

/// A table-scoped request in progress
pub struct TableRef {
    client: Arc<ClientInner>,
    table: String,
}

impl TableRef {
    /// Read `columns` (comma-separated, `*` for all)
    pub fn select(self, columns: &str) -> QueryBuilder {
        QueryBuilder::new(self.client, self.table).select(columns)
    }

    /// Insert one object or an array of objects
    pub fn insert(self, rows: impl Into<Value>) -> InsertRequest {
        InsertRequest::new(self.client, self.table, rows_from_value(rows.into()))
    }

    /// Update rows matching the filters added to the returned builder
    pub fn update(self, patch: impl Into<Value>) -> UpdateBuilder {
        UpdateBuilder::new(self.client, self.table, patch.into())
    }

    /// Delete rows matching the filters added to the returned builder
    pub fn delete(self) -> DeleteBuilder {
        DeleteBuilder::new(self.client, self.table)
    }
}
