//! # Planner
//!
//! Validates caller input against the schema registry and produces
//! [`Statement`]s. Nothing here touches the store: every rejection
//! (unknown identifier, bad value, missing filter) happens before SQL
//! exists.

use serde_json::Value;

use crate::observability::Logger;

use super::builder::{CountMode, QueryState};
use super::errors::{DataError, DataResult};
use super::filter::Predicate;
use super::schema::{clamp_updated_at, SchemaRegistry, TableSchema, CREATED_AT, UPDATED_AT};
use super::statement::{
    BoundPredicate, Ordering, Param, Projection, Record, SelectPlan, Statement, Touch,
};

/// Stateless planner over a registry
pub struct Planner<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Plan a read
    pub fn select(&self, state: &QueryState) -> DataResult<Statement> {
        let table = self.table(&state.table)?;
        let projection = self.projection(table, &state.select_columns)?;
        let predicates = self.predicates(table, &state.predicates)?;

        let order = match &state.order_column {
            Some(column) => {
                self.registry.column(table, column)?;
                Some(Ordering {
                    column: column.clone(),
                    ascending: state.order_ascending,
                })
            }
            None => None,
        };

        Ok(Statement::Select(SelectPlan {
            table: table.to_string(),
            projection,
            predicates,
            order,
            limit: state.limit,
            count_only: state.count_mode == CountMode::Exact,
        }))
    }

    /// Plan one row insert
    pub fn insert(&self, table: &str, row: &Record) -> DataResult<Statement> {
        let table = self.table(table)?;
        let mut row = row.clone();
        clamp_updated_at(&mut row);
        let values = self.assignments(table, &row)?;
        Ok(Statement::Insert {
            table: table.to_string(),
            values,
        })
    }

    /// Plan an update; requires a surviving predicate and a non-empty patch.
    ///
    /// When `touched_at` is given and the table declares `updated_at`, that
    /// column is assigned `touched_at` regardless of the patch, floored at
    /// the row's `created_at`. An `updated_at` the result would place
    /// before `created_at` is raised to it.
    pub fn update(
        &self,
        table: &str,
        predicates: &[Predicate],
        patch: &Record,
        touched_at: Option<&str>,
    ) -> DataResult<Statement> {
        let table = self.table(table)?;
        let predicates = self.write_scope(table, predicates, "update")?;
        if patch.is_empty() {
            return Err(DataError::MissingBody { operation: "update" });
        }

        let schema = self.registry.table(table)?;
        let mut patch = patch.clone();
        let mut touch = None;
        if let Some(stamp) = touched_at.filter(|_| schema.has_column(UPDATED_AT)) {
            let stamp = Value::String(stamp.to_string());
            if schema.has_column(CREATED_AT) && !patch.contains_key(CREATED_AT) {
                // Stored created_at is only known to the store
                patch.remove(UPDATED_AT);
                let (value, column_type) = self.registry.coerce(table, UPDATED_AT, &stamp)?;
                touch = Some(Touch {
                    column: UPDATED_AT.to_string(),
                    param: Param::new(value, column_type),
                    floor: CREATED_AT.to_string(),
                });
            } else {
                patch.insert(UPDATED_AT.to_string(), stamp);
            }
        }
        clamp_updated_at(&mut patch);

        let assignments = self.assignments(table, &patch)?;
        Ok(Statement::Update {
            table: table.to_string(),
            assignments,
            touch,
            predicates,
        })
    }

    /// Plan a delete; requires a surviving predicate
    pub fn delete(&self, table: &str, predicates: &[Predicate]) -> DataResult<Statement> {
        let table = self.table(table)?;
        let predicates = self.write_scope(table, predicates, "delete")?;
        Ok(Statement::Delete {
            table: table.to_string(),
            predicates,
        })
    }

    /// Schema of a table the request may target
    pub fn target(&self, table: &str) -> DataResult<&'a TableSchema> {
        let table = self.table(table)?;
        self.registry.table(table)
    }

    /// Validate and bind predicates, dropping those with an unrecognized
    /// operator.
    pub fn predicates(&self, table: &str, predicates: &[Predicate]) -> DataResult<Vec<BoundPredicate>> {
        let mut bound = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            let Some(operator) = predicate.operator() else {
                Logger::warn(
                    "PREDICATE_DROPPED",
                    &[
                        ("table", table),
                        ("column", &predicate.column),
                        ("operator", &predicate.operator),
                    ],
                );
                continue;
            };
            let (value, column_type) = self.registry.coerce(table, &predicate.column, &predicate.value)?;
            bound.push(BoundPredicate {
                column: predicate.column.clone(),
                operator,
                param: Param::new(value, column_type),
            });
        }
        Ok(bound)
    }

    fn write_scope(
        &self,
        table: &str,
        predicates: &[Predicate],
        operation: &'static str,
    ) -> DataResult<Vec<BoundPredicate>> {
        let bound = self.predicates(table, predicates)?;
        if bound.is_empty() {
            return Err(DataError::MissingFilter { operation });
        }
        Ok(bound)
    }

    fn table<'t>(&self, table: &'t str) -> DataResult<&'t str> {
        let table = table.trim();
        if table.is_empty() {
            return Err(DataError::MissingTable);
        }
        self.registry.table(table)?;
        Ok(table)
    }

    fn projection(&self, table: &str, select: &str) -> DataResult<Projection> {
        let columns: Vec<&str> = select
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();

        if columns.is_empty() || columns.contains(&"*") {
            return Ok(Projection::All);
        }

        let mut projected = Vec::with_capacity(columns.len());
        for column in columns {
            self.registry.column(table, column)?;
            projected.push(column.to_string());
        }
        Ok(Projection::Columns(projected))
    }

    fn assignments(&self, table: &str, row: &Record) -> DataResult<Vec<(String, Param)>> {
        row.iter()
            .map(|(column, value)| {
                let (value, column_type) = self.registry.coerce(table, column, value)?;
                Ok((column.clone(), Param::new(value, column_type)))
            })
            .collect()
    }
}
