//! Configuration
//!
//! Loaded from a JSON file; every field has a default, so a missing file
//! yields a usable configuration. Environment overrides:
//!
//! - `DATABASE_URL` replaces `database_url`
//! - `TABULA_PORT` replaces `http.port`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::Severity;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("Invalid config JSON: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on open connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a free connection (default: 30)
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 54321)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    54321
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl HttpConfig {
    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session emulation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the persisted `session` and `user` entries
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Table searched on sign-in
    #[serde(default = "default_profiles_table")]
    pub profiles_table: String,

    /// Column holding the Argon2 hash; `null` skips verification
    #[serde(default = "default_password_column")]
    pub password_column: Option<String>,

    /// Session lifetime in hours (default: 24)
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: i64,
}

fn default_session_dir() -> PathBuf {
    PathBuf::from(".tabula")
}

fn default_profiles_table() -> String {
    "profiles".to_string()
}

fn default_password_column() -> Option<String> {
    Some("password_hash".to_string())
}

fn default_ttl_hours() -> i64 {
    24
}

/// Longest accepted session lifetime (ten years)
pub const MAX_TTL_HOURS: i64 = 87_600;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            profiles_table: default_profiles_table(),
            password_column: default_password_column(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection string; required by `serve` and `query`
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Table written by `log_audit_event`
    #[serde(default = "default_audit_table")]
    pub audit_table: String,

    /// Schema whose tables form the allow-list
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Minimum log severity: trace, info, warn or error
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_audit_table() -> String {
    "audit_logs".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            pool: PoolConfig::default(),
            http: HttpConfig::default(),
            session: SessionConfig::default(),
            audit_table: default_audit_table(),
            schema: default_schema(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `path` (defaults if absent), apply environment overrides
    /// and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            Self::from_json(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `DATABASE_URL` and `TABULA_PORT` from `lookup`
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(port) = lookup("TABULA_PORT") {
            self.http.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("TABULA_PORT is not a port: {}", port)))?;
        }
        Ok(())
    }

    /// Check value ranges and names
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_connections == 0 {
            return Err(ConfigError::Invalid("pool.max_connections must be > 0".into()));
        }
        if self.session.ttl_hours <= 0 || self.session.ttl_hours > MAX_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "session.ttl_hours must be in 1..={}",
                MAX_TTL_HOURS
            )));
        }
        if self.schema.trim().is_empty() {
            return Err(ConfigError::Invalid("schema must not be empty".into()));
        }
        if self.session.profiles_table.trim().is_empty() {
            return Err(ConfigError::Invalid("session.profiles_table must not be empty".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// Parsed `log_level`
    pub fn severity(&self) -> Result<Severity, ConfigError> {
        self.log_level.parse().map_err(ConfigError::Invalid)
    }

    /// The connection string, or an error naming how to supply it
    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigError::Invalid("database_url is required (or set DATABASE_URL)".into()))
    }
}
