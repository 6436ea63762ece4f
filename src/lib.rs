//! tabula - table-agnostic query layer and REST surface over PostgreSQL
//!
//! Callers name a table, filters, output columns and an operation; the
//! query layer validates identifiers against the schema registry, compiles
//! parameterized SQL and returns `{data, error, count}`.

pub mod auth;
pub mod cli;
pub mod config;
pub mod http_server;
pub mod observability;
pub mod query;
pub mod store;
