//! CLI module for tabula
//!
//! Provides command-line interface for:
//! - serve: run the REST API
//! - query: one-shot read
//! - sign-in / sign-out / session: local session management
//! - hash-password: seed values for profile tables

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, QueryArgs};
pub use commands::{hash, query, run, run_command, serve, session, sign_in, sign_out};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_json_to};
