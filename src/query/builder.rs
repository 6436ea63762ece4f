//! # Query Builder
//!
//! Reads are described first and executed later. Builder calls only
//! accumulate [`QueryState`]; the store is touched when the builder is
//! awaited (or [`QueryBuilder::resolve`] is called).
//!
//! ## Resolution
//!
//! - **Building**: `select`, `eq`, `order`, `limit`, ... return a builder
//!   with a fresh, unresolved result slot.
//! - **Materializing**: the first `resolve` plans, compiles and executes
//!   the statement. Concurrent resolvers wait for that single execution.
//! - **Resolved**: later resolves, on this builder or its clones, return
//!   the cached response without executing again.

use std::future::IntoFuture;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::client::ClientInner;
use super::filter::{parse_filter, Predicate};
use super::response::QueryResponse;

/// Whether a read returns rows or only their number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountMode {
    #[default]
    None,
    /// `count(*)` over the filtered rows; `data` is null
    Exact,
}

/// Accumulated description of a read
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub table: String,
    pub select_columns: String,
    pub predicates: Vec<Predicate>,
    pub order_column: Option<String>,
    pub order_ascending: bool,
    pub limit: Option<u64>,
    pub count_mode: CountMode,
}

impl QueryState {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select_columns: "*".to_string(),
            predicates: Vec::new(),
            order_column: None,
            order_ascending: true,
            limit: None,
            count_mode: CountMode::None,
        }
    }
}

/// Filter methods shared by reads, updates and deletes.
///
/// Predicates are ANDed in the order they are added.
pub trait FilterBuilder: Sized {
    fn push_predicate(&mut self, predicate: Predicate);

    /// Add a predicate with an explicit operator token
    fn filter(mut self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.push_predicate(Predicate::new(column, operator, value.into()));
        self
    }

    fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, "eq", value)
    }

    fn neq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, "neq", value)
    }

    fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, "lte", value)
    }

    fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(column, "gte", value)
    }

    /// Negated form: `not("status", "eq", "x")` adds `not_eq`
    fn not(self, column: &str, operator: &str, value: impl Into<Value>) -> Self {
        self.filter(column, &format!("not_{}", operator), value)
    }

    /// Add a predicate from a raw `[<op>.]<value>` filter value
    fn filter_raw(self, column: &str, raw: impl Into<Value>) -> Self {
        let token = parse_filter(&raw.into());
        self.filter(column, &token.op, token.value)
    }
}

/// A deferred read
#[derive(Clone)]
pub struct QueryBuilder {
    client: Arc<ClientInner>,
    state: QueryState,
    single: bool,
    outcome: Arc<OnceCell<QueryResponse>>,
}

impl QueryBuilder {
    pub(crate) fn new(client: Arc<ClientInner>, table: String) -> Self {
        Self {
            client,
            state: QueryState::new(table),
            single: false,
            outcome: Arc::new(OnceCell::new()),
        }
    }

    /// Set the output columns
    pub fn select(self, columns: &str) -> Self {
        self.building(|state| state.select_columns = columns.to_string())
    }

    pub fn order(self, column: &str, ascending: bool) -> Self {
        self.building(|state| {
            state.order_column = Some(column.to_string());
            state.order_ascending = ascending;
        })
    }

    pub fn limit(self, limit: u64) -> Self {
        self.building(|state| state.limit = Some(limit))
    }

    pub fn count(self, mode: CountMode) -> Self {
        self.building(|state| state.count_mode = mode)
    }

    /// Narrow the resolved row list to its first row (or null)
    pub fn single(mut self) -> Self {
        self.single = true;
        self.building(|_| {})
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Whether the statement has already executed
    pub fn is_resolved(&self) -> bool {
        self.outcome.initialized()
    }

    /// Execute on first call; return the cached response afterwards
    pub async fn resolve(&self) -> QueryResponse {
        self.outcome
            .get_or_init(|| self.materialize())
            .await
            .clone()
    }

    async fn materialize(&self) -> QueryResponse {
        let statement = match self.client.planner().select(&self.state) {
            Ok(statement) => statement,
            Err(err) => return QueryResponse::failure(err),
        };

        let response = match self.client.execute(&statement).await {
            Ok(rows) if self.state.count_mode == CountMode::Exact => {
                let count = rows
                    .first()
                    .and_then(|row| row.get("count"))
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                QueryResponse::counted(count as usize)
            }
            Ok(rows) => QueryResponse::rows(rows),
            Err(err) => QueryResponse::failure(err),
        };

        if self.single {
            response.single()
        } else {
            response
        }
    }

    fn building(mut self, apply: impl FnOnce(&mut QueryState)) -> Self {
        apply(&mut self.state);
        self.outcome = Arc::new(OnceCell::new());
        self
    }
}

impl FilterBuilder for QueryBuilder {
    fn push_predicate(&mut self, predicate: Predicate) {
        self.state.predicates.push(predicate);
        self.outcome = Arc::new(OnceCell::new());
    }
}

impl IntoFuture for QueryBuilder {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'static, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.resolve().await })
    }
}

impl<'a> IntoFuture for &'a QueryBuilder {
    type Output = QueryResponse;
    type IntoFuture = BoxFuture<'a, QueryResponse>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.resolve())
    }
}
