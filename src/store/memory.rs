//! In-memory backend
//!
//! Interprets [`Statement`]s over per-table row vectors. Follows SQL
//! semantics where they are observable through the query layer:
//! comparisons against NULL never match (negated or not), NULLs sort last
//! ascending and first descending, `id` is unique and NOT NULL columns
//! are enforced. Used by tests and for running without a database.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::query::schema::{format_timestamp, parse_timestamp, SchemaRegistry, TableSchema};
use crate::query::statement::{
    BoundPredicate, Param, Projection, Record, SelectPlan, Statement, Touch,
};
use crate::query::Comparison;

use super::{Backend, StoreError, StoreResult};

/// Backend holding every table in process memory
pub struct MemoryBackend {
    registry: SchemaRegistry,
    tables: RwLock<HashMap<String, Vec<Record>>>,
    executed: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create empty tables for every table in `registry`
    pub fn new(registry: SchemaRegistry) -> Self {
        let tables = registry
            .table_names()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        Self {
            registry,
            tables: RwLock::new(tables),
            executed: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of statements executed (including failed ones)
    pub fn executed_statements(&self) -> usize {
        self.executed.load(AtomicOrdering::SeqCst)
    }

    pub fn reset_statement_count(&self) {
        self.executed.store(0, AtomicOrdering::SeqCst);
    }

    /// Snapshot of a table's rows
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .read()
            .ok()
            .and_then(|tables| tables.get(table).cloned())
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    fn schema(&self, table: &str) -> StoreResult<&TableSchema> {
        self.registry
            .table(table)
            .map_err(|_| StoreError::Execution(format!("relation \"{}\" does not exist", table)))
    }

    fn run(&self, statement: &Statement) -> StoreResult<Vec<Record>> {
        let schema = self.schema(statement.table())?;
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Execution("Lock poisoned".to_string()))?;
        let rows = tables.entry(statement.table().to_string()).or_default();

        match statement {
            Statement::Select(plan) => Ok(select(rows, plan)),
            Statement::Insert { table, values } => {
                let mut row = Record::new();
                for column in &schema.columns {
                    row.insert(column.name.clone(), Value::Null);
                }
                for (column, param) in values {
                    row.insert(column.clone(), param.value.clone());
                }
                check_row(table, schema, &row)?;
                check_unique_id(table, rows, &row, None)?;
                rows.push(row.clone());
                Ok(vec![row])
            }
            Statement::Update {
                table,
                assignments,
                touch,
                predicates,
            } => {
                let mut updated = Vec::new();
                for index in 0..rows.len() {
                    if !matches_all(&rows[index], predicates) {
                        continue;
                    }
                    let mut row = rows[index].clone();
                    for (column, param) in assignments {
                        row.insert(column.clone(), param.value.clone());
                    }
                    if let Some(touch) = touch {
                        row.insert(touch.column.clone(), floored_stamp(touch, &rows[index]));
                    }
                    check_row(table, schema, &row)?;
                    check_unique_id(table, rows, &row, Some(index))?;
                    updated.push((index, row));
                }
                for (index, row) in &updated {
                    rows[*index] = row.clone();
                }
                Ok(updated.into_iter().map(|(_, row)| row).collect())
            }
            Statement::Delete { predicates, .. } => {
                let (removed, kept): (Vec<Record>, Vec<Record>) = rows
                    .drain(..)
                    .partition(|row| matches_all(row, predicates));
                *rows = kept;
                Ok(removed)
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, statement: &Statement) -> StoreResult<Vec<Record>> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.executed.fetch_add(1, AtomicOrdering::SeqCst);
        self.run(statement)
    }

    async fn close(&self) {
        self.closed.store(true, AtomicOrdering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn select(rows: &[Record], plan: &SelectPlan) -> Vec<Record> {
    let mut matched: Vec<&Record> = rows
        .iter()
        .filter(|row| matches_all(row, &plan.predicates))
        .collect();

    if plan.count_only {
        let mut row = Record::new();
        row.insert("count".to_string(), Value::from(matched.len() as u64));
        return vec![row];
    }

    if let Some(order) = &plan.order {
        matched.sort_by(|a, b| {
            let ordering = sort_key_cmp(a.get(&order.column), b.get(&order.column));
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
    }

    if let Some(limit) = plan.limit {
        matched.truncate(limit as usize);
    }

    matched
        .into_iter()
        .map(|row| match &plan.projection {
            Projection::All => row.clone(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
                .collect(),
        })
        .collect()
}

/// `GREATEST(stamp, floor)` over the row as it was before the update
fn floored_stamp(touch: &Touch, row: &Record) -> Value {
    let floor = row
        .get(&touch.floor)
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    let stamp = touch.param.value.as_str().and_then(parse_timestamp);
    match (stamp, floor) {
        (Some(stamp), Some(floor)) if floor > stamp => Value::String(format_timestamp(&floor)),
        _ => touch.param.value.clone(),
    }
}

fn check_row(table: &str, schema: &TableSchema, row: &Record) -> StoreResult<()> {
    for column in schema.columns.iter().filter(|c| !c.nullable) {
        if row.get(&column.name).map_or(true, Value::is_null) {
            return Err(StoreError::Execution(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                column.name, table
            )));
        }
    }
    Ok(())
}

fn check_unique_id(table: &str, rows: &[Record], row: &Record, skip: Option<usize>) -> StoreResult<()> {
    let Some(id) = row.get("id").filter(|id| !id.is_null()) else {
        return Ok(());
    };
    let duplicate = rows
        .iter()
        .enumerate()
        .any(|(index, existing)| Some(index) != skip && existing.get("id") == Some(id));
    if duplicate {
        return Err(StoreError::Execution(format!(
            "duplicate key value violates unique constraint \"{}_pkey\"",
            table
        )));
    }
    Ok(())
}

fn matches_all(row: &Record, predicates: &[BoundPredicate]) -> bool {
    predicates.iter().all(|p| evaluate(row, p) == Some(true))
}

/// Three-valued predicate result; `None` is SQL's unknown
fn evaluate(row: &Record, predicate: &BoundPredicate) -> Option<bool> {
    let ordering = compare(row.get(&predicate.column), &predicate.param)?;
    let result = match predicate.operator.comparison {
        Comparison::Eq => ordering == Ordering::Equal,
        Comparison::Neq => ordering != Ordering::Equal,
        Comparison::Lte => ordering != Ordering::Greater,
        Comparison::Gte => ordering != Ordering::Less,
    };
    Some(result != predicate.operator.negated)
}

fn compare(stored: Option<&Value>, param: &Param) -> Option<Ordering> {
    compare_values(stored?, &param.value)
}

/// Compare two non-null values of the same kind
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::Number(a), Value::Number(b)) if a == b => Some(Ordering::Equal),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            Some(a.to_string().cmp(&b.to_string()))
        }
        _ => None,
    }
}

/// Sort order with NULLs after every value
fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
