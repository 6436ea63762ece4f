//! # Schema Registry
//!
//! The allow-list of tables and columns that may appear in compiled SQL,
//! together with each column's type. Identifiers not in the registry are
//! rejected before any statement is built, and every bound value is
//! coerced to its column type first.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use uuid::Uuid;

use super::errors::{DataError, DataResult};
use super::statement::Record;

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Column types the query layer knows how to bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Integer,
    Numeric,
    Boolean,
    Uuid,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Map an `information_schema.columns.data_type` value
    pub fn from_pg(data_type: &str) -> Self {
        match data_type {
            "smallint" | "integer" | "bigint" => ColumnType::Integer,
            "numeric" | "real" | "double precision" | "decimal" => ColumnType::Numeric,
            "boolean" => ColumnType::Boolean,
            "uuid" => ColumnType::Uuid,
            "date" | "timestamp with time zone" | "timestamp without time zone" => {
                ColumnType::Timestamp
            }
            "json" | "jsonb" => ColumnType::Json,
            _ => ColumnType::Text,
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Integer => "integer",
            ColumnType::Numeric => "numeric",
            ColumnType::Boolean => "boolean",
            ColumnType::Uuid => "uuid",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Json => "json",
        }
    }

    /// Coerce a JSON value to this column type.
    ///
    /// Query-string filters arrive as text, so numeric and boolean columns
    /// accept their textual forms. Null is valid for every type.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || format!("expected {}, got {}", self.type_name(), value);

        match self {
            ColumnType::Json => Ok(value.clone()),
            ColumnType::Text => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(mismatch()),
            },
            ColumnType::Integer => match value {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Ok(Value::from(i)),
                    None => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Ok(Value::from(f as i64))
                        }
                        _ => Err(mismatch()),
                    },
                },
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            ColumnType::Numeric => match value {
                Value::Number(_) => Ok(value.clone()),
                Value::String(s) => parse_decimal(s).map(Value::Number).ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
            ColumnType::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.as_str() {
                    "true" | "t" => Ok(Value::Bool(true)),
                    "false" | "f" => Ok(Value::Bool(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            ColumnType::Uuid => match value {
                Value::String(s) => Uuid::parse_str(s.trim())
                    .map(|id| Value::String(id.to_string()))
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            ColumnType::Timestamp => match value {
                Value::String(s) => parse_timestamp(s)
                    .map(|ts| Value::String(format_timestamp(&ts)))
                    .ok_or_else(mismatch),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Parse decimal text without losing digits.
///
/// JSON number syntax is kept verbatim; forms only Rust's float parser
/// accepts (`+1`, `.5`) go through `f64`.
fn parse_decimal(raw: &str) -> Option<Number> {
    let raw = raw.trim();
    raw.parse::<Number>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .and_then(Number::from_f64)
    })
}

/// Parse RFC 3339, a naive ISO-8601 datetime (taken as UTC) or a bare date
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical timestamp text: ISO-8601, millisecond precision, `Z` suffix
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Raise a row's `updated_at` to its `created_at` when it is earlier.
///
/// Rows missing either column, or holding unparseable values, are left
/// for coercion to judge.
pub fn clamp_updated_at(row: &mut Record) {
    let stamp = |column: &str| row.get(column).and_then(Value::as_str).and_then(parse_timestamp);
    if let (Some(created), Some(updated)) = (stamp(CREATED_AT), stamp(UPDATED_AT)) {
        if updated < created {
            row.insert(UPDATED_AT.to_string(), Value::String(format_timestamp(&created)));
        }
    }
}

/// Column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Mark the column NOT NULL
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Columns of one table, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self { columns }
    }

    /// Look up a column definition
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table declares `name`
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Known tables and their columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table (builder style)
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        self.insert_table(name, TableSchema::new(columns));
        self
    }

    /// Register or replace a table
    pub fn insert_table(&mut self, name: impl Into<String>, table: TableSchema) {
        self.tables.insert(name.into(), table);
    }

    /// Append a column to a table, creating the table on first use
    pub fn push_column(&mut self, table: &str, column: ColumnDef) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .columns
            .push(column);
    }

    /// Look up a table, rejecting unknown names
    pub fn table(&self, name: &str) -> DataResult<&TableSchema> {
        self.tables
            .get(name)
            .ok_or_else(|| DataError::UnknownTable(name.to_string()))
    }

    /// Look up a column on a table, rejecting unknown names
    pub fn column(&self, table: &str, column: &str) -> DataResult<&ColumnDef> {
        self.table(table)?
            .column(column)
            .ok_or_else(|| DataError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            })
    }

    /// Coerce a value for `table.column`
    pub fn coerce(&self, table: &str, column: &str, value: &Value) -> DataResult<(Value, ColumnType)> {
        let def = self.column(table, column)?;
        let coerced = def
            .column_type
            .coerce(value)
            .map_err(|reason| DataError::TypeMismatch(format!("column {}: {}", column, reason)))?;
        Ok((coerced, def.column_type))
    }

    /// Registered table names
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
