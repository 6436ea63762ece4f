//! CLI command implementations
//!
//! Each command loads the configuration, applies the log threshold and,
//! when it needs the database, opens a pool for its own duration on a
//! dedicated tokio runtime.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Runtime;

use crate::auth::crypto::hash_password;
use crate::auth::{Credentials, FileStore, LocalStore, SessionOptions, SessionStore};
use crate::config::Config;
use crate::http_server::params::parse_order;
use crate::http_server::HttpServer;
use crate::observability::Logger;
use crate::query::{Client, ClientOptions, FilterBuilder, QueryBuilder, QueryResponse};

use super::args::{Command, QueryArgs};
use super::errors::{CliError, CliResult};
use super::io::write_json;

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Query { config, request } => query(&config, &request),
        Command::SignIn {
            config,
            email,
            username,
            password,
        } => sign_in(
            &config,
            &Credentials {
                email,
                username,
                password,
            },
        ),
        Command::SignOut { config } => sign_out(&config),
        Command::Session { config } => session(&config),
        Command::HashPassword { password } => hash(&password),
    }
}

/// Serve the REST API until the listener fails
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    runtime()?.block_on(async {
        let client = connect(&config).await?;
        let server = HttpServer::new(config.http.clone(), client.clone());

        let result = server
            .start()
            .await
            .map_err(|e| CliError::serve_failed(format!("HTTP server failed: {}", e)));

        client.close().await;
        result
    })
}

/// Run one read and print `{data, error, count}`
pub fn query(config_path: &Path, request: &QueryArgs) -> CliResult<()> {
    let config = load_config(config_path)?;

    let response = runtime()?.block_on(async {
        let client = connect(&config).await?;
        let response = match build_query(&client, request) {
            Ok(builder) => Ok(builder.await),
            Err(e) => Err(e),
        };
        client.close().await;
        response
    })?;

    report(&response)
}

/// Sign in through the configured profiles table
pub fn sign_in(config_path: &Path, credentials: &Credentials) -> CliResult<()> {
    let config = load_config(config_path)?;
    let sessions = session_store(&config);

    let response = runtime()?.block_on(async {
        let client = connect(&config).await?;
        let response = sessions.sign_in(&client, credentials).await;
        client.close().await;
        Ok::<_, CliError>(response)
    })?;

    report(&response)
}

/// Clear the persisted session
pub fn sign_out(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    report(&session_store(&config).sign_out())
}

/// Print the persisted session, or null when absent or expired
pub fn session(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    write_json(&session_store(&config).get_session())
}

/// Print an Argon2 hash of `password`
pub fn hash(password: &str) -> CliResult<()> {
    let hash = hash_password(password)
        .map_err(|e| CliError::invalid_argument(format!("Failed to hash password: {}", e)))?;
    write_json(&Value::String(hash))
}

fn load_config(path: &Path) -> CliResult<Config> {
    let config = Config::load(path)?;
    Logger::set_threshold(config.severity()?);
    Ok(config)
}

fn runtime() -> CliResult<Runtime> {
    Runtime::new().map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))
}

async fn connect(config: &Config) -> CliResult<Client> {
    let options = ClientOptions {
        audit_table: config.audit_table.clone(),
    };
    Client::connect(config.database_url()?, &config.pool, &config.schema, options)
        .await
        .map_err(|e| CliError::connect_failed(e.to_string()))
}

fn session_store(config: &Config) -> SessionStore {
    let local: Arc<dyn LocalStore> = Arc::new(FileStore::new(config.session.dir.clone()));
    SessionStore::new(Some(local), SessionOptions::from(&config.session))
}

/// Build the read described by `request`
fn build_query(client: &Client, request: &QueryArgs) -> CliResult<QueryBuilder> {
    let mut builder = client.from(request.table.as_str()).select(&request.select);

    for filter in &request.filters {
        let (column, raw) = filter.split_once('=').ok_or_else(|| {
            CliError::invalid_argument(format!("Filter must be column=[op.]value: {}", filter))
        })?;
        builder = builder.filter_raw(column, raw);
    }
    if let Some(order) = &request.order {
        let (column, ascending) =
            parse_order(order).map_err(|e| CliError::invalid_argument(e.to_string()))?;
        builder = builder.order(&column, ascending);
    }
    if let Some(limit) = request.limit {
        builder = builder.limit(limit);
    }

    Ok(builder)
}

/// Print the response; a carried error also fails the command
fn report(response: &QueryResponse) -> CliResult<()> {
    write_json(response)?;
    match &response.error {
        Some(err) => Err(CliError::query_failed(err)),
        None => Ok(()),
    }
}
