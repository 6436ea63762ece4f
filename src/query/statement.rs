//! Validated statements
//!
//! A [`Statement`] only ever holds identifiers that passed the schema
//! registry and values already coerced to their column type. Backends
//! execute statements; they never see raw request input.

use serde_json::{Map, Value};

use super::filter::Operator;
use super::schema::ColumnType;

/// A row: column name to value
pub type Record = Map<String, Value>;

/// A bound value together with the type it binds as
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
    pub column_type: ColumnType,
}

impl Param {
    pub fn new(value: Value, column_type: ColumnType) -> Self {
        Self { value, column_type }
    }
}

/// A predicate whose column and operator have been validated
#[derive(Debug, Clone, PartialEq)]
pub struct BoundPredicate {
    pub column: String,
    pub operator: Operator,
    pub param: Param,
}

/// Output columns of a select
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
}

/// `ORDER BY` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub column: String,
    pub ascending: bool,
}

/// A read
#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub table: String,
    pub projection: Projection,
    pub predicates: Vec<BoundPredicate>,
    pub order: Option<Ordering>,
    pub limit: Option<u64>,
    /// Return a single `{count}` row instead of the rows themselves
    pub count_only: bool,
}

/// Modification stamp on update, floored at another column of the same
/// row: `"<column>" = GREATEST($n, "<floor>")`
#[derive(Debug, Clone, PartialEq)]
pub struct Touch {
    pub column: String,
    pub param: Param,
    pub floor: String,
}

/// One executable statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectPlan),
    Insert {
        table: String,
        values: Vec<(String, Param)>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Param)>,
        touch: Option<Touch>,
        predicates: Vec<BoundPredicate>,
    },
    Delete {
        table: String,
        predicates: Vec<BoundPredicate>,
    },
}

impl Statement {
    /// Target table
    pub fn table(&self) -> &str {
        match self {
            Statement::Select(plan) => &plan.table,
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => table,
        }
    }

    /// Statement kind for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(plan) if plan.count_only => "count",
            Statement::Select(_) => "select",
            Statement::Insert { .. } => "insert",
            Statement::Update { .. } => "update",
            Statement::Delete { .. } => "delete",
        }
    }
}
