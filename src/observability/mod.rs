//! Observability for tabula
//!
//! Structured JSON logging only. Every line is a single event:
//!
//! ```ignore
//! use tabula::observability::Logger;
//!
//! Logger::info("POOL_OPENED", &[("max_connections", "10")]);
//! ```

mod logger;

pub use logger::{Logger, Severity};
