//! # Query Layer
//!
//! Table-agnostic reads and writes over a relational store.
//!
//! Request flow:
//! 1. A [`QueryBuilder`] (or a mutation request) accumulates table,
//!    columns and predicates
//! 2. The [`plan::Planner`] validates identifiers against the
//!    [`SchemaRegistry`] and coerces values
//! 3. The [`compiler`] produces parameterized SQL
//! 4. A [`crate::store::Backend`] executes it
//! 5. The outcome is wrapped in a [`QueryResponse`]

pub mod builder;
pub mod client;
pub mod compiler;
pub mod errors;
pub mod filter;
pub mod mutation;
pub mod plan;
pub mod response;
pub mod rpc;
pub mod schema;
pub mod statement;

pub use builder::{CountMode, FilterBuilder, QueryBuilder, QueryState};
pub use client::{Client, ClientOptions, TableRef};
pub use errors::{DataError, DataResult, ErrorResponse};
pub use filter::{parse_filter, Comparison, FilterToken, Operator, Predicate};
pub use mutation::{DeleteBuilder, InsertRequest, MutationEngine, UpdateBuilder};
pub use response::QueryResponse;
pub use schema::{ColumnDef, ColumnType, SchemaRegistry, TableSchema};
pub use statement::Record;
