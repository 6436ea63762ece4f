//! # Predicate Compiler
//!
//! Turns validated statements into SQL text plus positional parameters.
//!
//! Values are always bound (`$1`, `$2`, ...), never spliced into the text.
//! Identifiers are spliced, but only after the schema registry has
//! accepted them, and always double-quoted.

use super::schema::ColumnType;
use super::statement::{BoundPredicate, Param, Projection, SelectPlan, Statement};

/// SQL text with its parameters in `$n` order
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Param>,
}

/// Double-quote an identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Placeholder `$n` for a parameter.
///
/// Numeric values bind as their decimal text and are cast server-side, so
/// no digit passes through a float.
fn placeholder(param: &Param, n: usize) -> String {
    match param.column_type {
        ColumnType::Numeric => format!("${}::numeric", n),
        _ => format!("${}", n),
    }
}

/// Compile ANDed predicates into a WHERE fragment (without the keyword).
///
/// Placeholders continue from `params.len() + 1`, so the fragment can
/// follow a SET list. Returns `None` for an empty predicate list.
pub fn compile_where(predicates: &[BoundPredicate], params: &mut Vec<Param>) -> Option<String> {
    if predicates.is_empty() {
        return None;
    }

    let clauses: Vec<String> = predicates
        .iter()
        .map(|predicate| {
            params.push(predicate.param.clone());
            let clause = format!(
                "{} {} {}",
                quote_ident(&predicate.column),
                predicate.operator.comparison.sql(),
                placeholder(&predicate.param, params.len())
            );
            if predicate.operator.negated {
                format!("NOT ({})", clause)
            } else {
                clause
            }
        })
        .collect();

    Some(clauses.join(" AND "))
}

/// Compile a full statement
pub fn compile(statement: &Statement) -> CompiledSql {
    let mut params = Vec::new();
    let sql = match statement {
        Statement::Select(plan) => compile_select(plan, &mut params),
        Statement::Insert { table, values } => {
            if values.is_empty() {
                format!("INSERT INTO {} DEFAULT VALUES RETURNING *", quote_ident(table))
            } else {
                let mut columns = Vec::with_capacity(values.len());
                let mut placeholders = Vec::with_capacity(values.len());
                for (column, param) in values {
                    params.push(param.clone());
                    columns.push(quote_ident(column));
                    placeholders.push(placeholder(param, params.len()));
                }
                format!(
                    "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                    quote_ident(table),
                    columns.join(", "),
                    placeholders.join(", ")
                )
            }
        }
        Statement::Update {
            table,
            assignments,
            touch,
            predicates,
        } => {
            let mut set: Vec<String> = assignments
                .iter()
                .map(|(column, param)| {
                    params.push(param.clone());
                    format!("{} = {}", quote_ident(column), placeholder(param, params.len()))
                })
                .collect();
            if let Some(touch) = touch {
                params.push(touch.param.clone());
                set.push(format!(
                    "{} = GREATEST({}, {})",
                    quote_ident(&touch.column),
                    placeholder(&touch.param, params.len()),
                    quote_ident(&touch.floor)
                ));
            }
            let mut sql = format!("UPDATE {} SET {}", quote_ident(table), set.join(", "));
            if let Some(clause) = compile_where(predicates, &mut params) {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql.push_str(" RETURNING *");
            sql
        }
        Statement::Delete { table, predicates } => {
            let mut sql = format!("DELETE FROM {}", quote_ident(table));
            if let Some(clause) = compile_where(predicates, &mut params) {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
            sql.push_str(" RETURNING *");
            sql
        }
    };

    CompiledSql { sql, params }
}

/// `SELECT <columns> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT n]`
fn compile_select(plan: &SelectPlan, params: &mut Vec<Param>) -> String {
    let columns = if plan.count_only {
        "count(*) AS count".to_string()
    } else {
        match &plan.projection {
            Projection::All => "*".to_string(),
            Projection::Columns(columns) => columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
        }
    };

    let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(&plan.table));

    if let Some(clause) = compile_where(&plan.predicates, params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }

    if plan.count_only {
        return sql;
    }

    if let Some(order) = &plan.order {
        sql.push_str(&format!(
            " ORDER BY {} {}",
            quote_ident(&order.column),
            if order.ascending { "ASC" } else { "DESC" }
        ));
    }

    if let Some(limit) = plan.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    sql
}
