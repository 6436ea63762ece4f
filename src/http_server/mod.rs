//! # HTTP Server Module
//!
//! Axum server exposing the query layer.
//!
//! # Endpoints
//!
//! - `/health` - Health check
//! - `/rest/v1/:table` - Table reads and writes
//! - `/rest/v1/rpc/:function` - Named procedure calls

pub mod health_routes;
pub mod params;
pub mod rest_routes;
pub mod server;

pub use rest_routes::RestState;
pub use server::{build_router, HttpServer};
