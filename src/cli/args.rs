//! CLI argument definitions using clap
//!
//! Commands:
//! - tabula serve --config <path> [--port <n>]
//! - tabula query <table> [--select] [--filter col=op.val]... [--order] [--limit]
//! - tabula sign-in (--email | --username) --password
//! - tabula sign-out
//! - tabula session
//! - tabula hash-password --password

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// tabula - table-agnostic REST and query layer over PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the REST API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./tabula.json")]
        config: PathBuf,

        /// Port override
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one read and print the result
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./tabula.json")]
        config: PathBuf,

        #[command(flatten)]
        request: QueryArgs,
    },

    /// Sign in and persist the session locally
    SignIn {
        /// Path to configuration file
        #[arg(long, default_value = "./tabula.json")]
        config: PathBuf,

        #[arg(long, conflicts_with = "username", required_unless_present = "username")]
        email: Option<String>,

        #[arg(long)]
        username: Option<String>,

        #[arg(long)]
        password: Option<String>,
    },

    /// Clear the persisted session
    SignOut {
        /// Path to configuration file
        #[arg(long, default_value = "./tabula.json")]
        config: PathBuf,
    },

    /// Print the persisted session, or null
    Session {
        /// Path to configuration file
        #[arg(long, default_value = "./tabula.json")]
        config: PathBuf,
    },

    /// Print an Argon2 hash for seeding a profiles table
    HashPassword {
        #[arg(long)]
        password: String,
    },
}

/// Read request arguments
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Table to read
    pub table: String,

    /// Comma-separated output columns
    #[arg(long, default_value = "*")]
    pub select: String,

    /// Filter as `column=[op.]value`; repeatable
    #[arg(long = "filter")]
    pub filters: Vec<String>,

    /// `column[.asc|.desc]`
    #[arg(long)]
    pub order: Option<String>,

    #[arg(long)]
    pub limit: Option<u64>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
