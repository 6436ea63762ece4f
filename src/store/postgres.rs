//! PostgreSQL backend
//!
//! Owns a bounded `sqlx` pool. Each statement checks out one connection
//! for its own execution and returns it when done, on success or failure.
//!
//! Statements are wrapped as
//! `WITH r AS (<statement>) SELECT to_jsonb(r) AS row FROM r` so every
//! result, whatever its column types, decodes as one JSON object per row.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{Postgres, Row};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::observability::Logger;
use crate::query::compiler::compile;
use crate::query::schema::{parse_timestamp, ColumnDef, ColumnType, SchemaRegistry};
use crate::query::statement::{Param, Record, Statement};

use super::{Backend, StoreError, StoreResult};

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// SQLSTATEs reported as type mismatches: invalid text representation,
/// datatype mismatch, undefined function (no operator for the types),
/// invalid datetime format, datetime field overflow.
const TYPE_MISMATCH_CODES: [&str; 5] = ["22P02", "42804", "42883", "22007", "22008"];

const COLUMNS_SQL: &str = "SELECT table_name::text, column_name::text, data_type::text, is_nullable::text \
     FROM information_schema.columns \
     WHERE table_schema = $1 \
     ORDER BY table_name, ordinal_position";

/// Pooled PostgreSQL backend
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    /// Open the pool; fails if no connection can be established
    pub async fn connect(database_url: &str, config: &PoolConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        Logger::info(
            "POOL_OPENED",
            &[
                ("acquire_timeout_secs", &config.acquire_timeout_secs.to_string()),
                ("max_connections", &config.max_connections.to_string()),
            ],
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Backend for PgBackend {
    async fn execute(&self, statement: &Statement) -> StoreResult<Vec<Record>> {
        let compiled = compile(statement);
        let sql = format!(
            "WITH r AS ({}) SELECT to_jsonb(r) AS row FROM r",
            compiled.sql
        );

        let mut query = sqlx::query(&sql);
        for param in &compiled.params {
            query = bind_param(query, param)?;
        }

        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let Json(value) = row
                    .try_get::<Json<Value>, _>("row")
                    .map_err(map_sqlx_error)?;
                match value {
                    Value::Object(record) => Ok(record),
                    other => Err(StoreError::Execution(format!(
                        "unexpected row shape: {}",
                        other
                    ))),
                }
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        Logger::info("POOL_CLOSED", &[]);
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

impl SchemaRegistry {
    /// Load every table and column of `schema` from `information_schema`
    pub async fn introspect(backend: &PgBackend, schema: &str) -> StoreResult<Self> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(COLUMNS_SQL)
            .bind(schema)
            .fetch_all(backend.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut registry = SchemaRegistry::new();
        for (table, column, data_type, is_nullable) in rows {
            let mut def = ColumnDef::new(column, ColumnType::from_pg(&data_type));
            def.nullable = is_nullable == "YES";
            registry.push_column(&table, def);
        }

        Logger::info(
            "SCHEMA_LOADED",
            &[
                ("schema", schema),
                ("tables", &registry.table_names().count().to_string()),
            ],
        );

        Ok(registry)
    }
}

/// Bind one parameter with the Rust type matching its column type.
///
/// NULLs are bound as typed `None` so PostgreSQL infers the same type it
/// would for a value.
fn bind_param<'q>(query: PgQuery<'q>, param: &Param) -> StoreResult<PgQuery<'q>> {
    let mismatch = || {
        StoreError::TypeMismatch(format!(
            "cannot bind {} as {}",
            param.value, param.column_type
        ))
    };

    if param.value.is_null() {
        return Ok(match param.column_type {
            ColumnType::Text => query.bind(None::<String>),
            ColumnType::Integer => query.bind(None::<i64>),
            ColumnType::Numeric => query.bind(None::<String>),
            ColumnType::Boolean => query.bind(None::<bool>),
            ColumnType::Uuid => query.bind(None::<Uuid>),
            ColumnType::Timestamp => query.bind(None::<DateTime<Utc>>),
            ColumnType::Json => query.bind(None::<Json<Value>>),
        });
    }

    let query = match param.column_type {
        ColumnType::Text => match &param.value {
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(other.to_string()),
        },
        ColumnType::Integer => query.bind(param.value.as_i64().ok_or_else(mismatch)?),
        // Decimal text, cast by the `::numeric` placeholder
        ColumnType::Numeric => match &param.value {
            Value::Number(n) => query.bind(n.to_string()),
            _ => return Err(mismatch()),
        },
        ColumnType::Boolean => query.bind(param.value.as_bool().ok_or_else(mismatch)?),
        ColumnType::Uuid => {
            let id = param
                .value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or_else(mismatch)?;
            query.bind(id)
        }
        ColumnType::Timestamp => {
            let ts = param
                .value
                .as_str()
                .and_then(parse_timestamp)
                .ok_or_else(mismatch)?;
            query.bind(ts)
        }
        ColumnType::Json => query.bind(Json(param.value.clone())),
    };

    Ok(query)
}

/// Map a driver error, keeping database messages verbatim
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            match db.code() {
                Some(code) if TYPE_MISMATCH_CODES.contains(&&*code) => {
                    StoreError::TypeMismatch(message)
                }
                _ => StoreError::Execution(message),
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Pool(err.to_string()),
        sqlx::Error::PoolClosed => StoreError::Closed,
        _ => StoreError::Execution(err.to_string()),
    }
}
