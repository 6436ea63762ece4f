//! # Session Emulation
//!
//! Sign-in looks up a profile row by `email` (preferred) or `username`,
//! verifies the password against the row's Argon2 hash, mints an opaque
//! token and persists `{session, user}` under the `session` and `user`
//! keys of a local store.
//!
//! Verification can be disabled by configuring no password column; the
//! lookup alone then signs the caller in, and `SIGN_IN_UNVERIFIED` is
//! logged for every such sign-in.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::{SessionConfig, MAX_TTL_HOURS};
use crate::observability::Logger;
use crate::query::{Client, DataError, DataResult, FilterBuilder, QueryResponse, Record};

use super::crypto::{generate_token, verify_password};
use super::local_store::LocalStore;

/// Key holding the serialized [`Session`]
pub const SESSION_KEY: &str = "session";

/// Key holding the serialized user record
pub const USER_KEY: &str = "user";

/// A signed-in session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: Record,
    pub access_token: String,
    /// Expiry, epoch milliseconds
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }
}

/// Sign-in input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn email(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            username: None,
            password: Some(password.into()),
        }
    }

    pub fn username(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: None,
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Lookup column and value; email wins when both are given
    fn lookup(&self) -> DataResult<(&'static str, &str)> {
        match (&self.email, &self.username) {
            (Some(email), _) => Ok(("email", email)),
            (None, Some(username)) => Ok(("username", username)),
            (None, None) => Err(DataError::InvalidBody(
                "email or username is required".to_string(),
            )),
        }
    }
}

/// Session store options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub profiles_table: String,
    pub password_column: Option<String>,
    pub ttl: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            profiles_table: config.profiles_table.clone(),
            password_column: config.password_column.clone(),
            ttl: Duration::hours(config.ttl_hours.clamp(1, MAX_TTL_HOURS)),
        }
    }
}

/// Sign-in, sign-out and session reads over a local store
pub struct SessionStore {
    local: Option<Arc<dyn LocalStore>>,
    options: SessionOptions,
}

impl SessionStore {
    /// `local = None` models a non-interactive context: sign-in still
    /// returns the session but nothing is persisted, and reads return `None`.
    pub fn new(local: Option<Arc<dyn LocalStore>>, options: SessionOptions) -> Self {
        Self {
            local,
            options,
        }
    }

    /// Sign in by looking the caller up through `client`; `data` is
    /// `{user, session}` on success
    pub async fn sign_in(&self, client: &Client, credentials: &Credentials) -> QueryResponse {
        match self.try_sign_in(client, credentials).await {
            Ok(session) => {
                let data = json!({ "user": session.user, "session": session });
                QueryResponse::value(data, 1)
            }
            Err(err) => QueryResponse::failure(err),
        }
    }

    async fn try_sign_in(&self, client: &Client, credentials: &Credentials) -> DataResult<Session> {
        let (column, value) = credentials.lookup()?;

        let found = client
            .from(self.options.profiles_table.as_str())
            .select("*")
            .eq(column, value)
            .limit(1)
            .single()
            .await
            .into_result()?;

        let Value::Object(mut user) = found else {
            return Err(DataError::AuthNotFound);
        };

        match &self.options.password_column {
            Some(password_column) => {
                let stored = user
                    .remove(password_column)
                    .and_then(|hash| hash.as_str().map(str::to_string));
                let verified = match (stored, credentials.password.as_deref()) {
                    (Some(hash), Some(password)) => verify_password(password, &hash),
                    _ => false,
                };
                if !verified {
                    return Err(DataError::InvalidCredentials);
                }
            }
            None => Logger::warn(
                "SIGN_IN_UNVERIFIED",
                &[("lookup", column), ("table", &self.options.profiles_table)],
            ),
        }

        let session = Session {
            user,
            access_token: generate_token(),
            expires_at: (Utc::now() + self.options.ttl).timestamp_millis(),
        };
        self.persist(&session)?;

        let user_id = session.user.get("id").map(|id| id.to_string()).unwrap_or_default();
        Logger::info("SIGN_IN", &[("lookup", column), ("user_id", &user_id)]);

        Ok(session)
    }

    fn persist(&self, session: &Session) -> DataResult<()> {
        let Some(local) = &self.local else {
            return Ok(());
        };
        let session_json = serde_json::to_string(session).map_err(|e| DataError::Session(e.to_string()))?;
        let user_json = serde_json::to_string(&session.user).map_err(|e| DataError::Session(e.to_string()))?;
        local
            .set(SESSION_KEY, &session_json)
            .and_then(|_| local.set(USER_KEY, &user_json))
            .map_err(|e| DataError::Session(e.to_string()))
    }

    /// Clear both persisted keys
    pub fn sign_out(&self) -> QueryResponse {
        if let Some(local) = &self.local {
            let cleared = local.remove(SESSION_KEY).and_then(|_| local.remove(USER_KEY));
            if let Err(e) = cleared {
                return QueryResponse::failure(DataError::Session(e.to_string()));
            }
        }
        Logger::info("SIGN_OUT", &[]);
        QueryResponse::value(Value::Null, 0)
    }

    /// The persisted session; `None` when absent, unreadable or expired
    pub fn get_session(&self) -> Option<Session> {
        let raw = self.local.as_ref()?.get(SESSION_KEY).ok()??;
        let session: Session = serde_json::from_str(&raw).ok()?;
        if session.is_expired() {
            return None;
        }
        Some(session)
    }

    /// The persisted user record; `None` when absent or unreadable
    pub fn get_user(&self) -> Option<Record> {
        let raw = self.local.as_ref()?.get(USER_KEY).ok()??;
        serde_json::from_str(&raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::crypto::hash_password;
    use crate::auth::local_store::{FileStore, MemoryStore};
    use crate::query::{ColumnDef, ColumnType, SchemaRegistry};
    use crate::store::MemoryBackend;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new().with_table(
            "profiles",
            vec![
                ColumnDef::new("id", ColumnType::Uuid).required(),
                ColumnDef::new("email", ColumnType::Text),
                ColumnDef::new("username", ColumnType::Text),
                ColumnDef::new("password_hash", ColumnType::Text),
                ColumnDef::new("created_at", ColumnType::Timestamp),
                ColumnDef::new("updated_at", ColumnType::Timestamp),
            ],
        )
    }

    async fn client_with_profile() -> Client {
        let backend = Arc::new(MemoryBackend::new(registry()));
        let client = Client::new(backend, registry());
        let hash = hash_password("s3cret").unwrap();
        let created = client
            .from("profiles")
            .insert(json!({"email": "ana@example.com", "username": "ana", "password_hash": hash}))
            .await;
        assert!(created.is_ok());
        client
    }

    fn store(local: Arc<dyn LocalStore>) -> SessionStore {
        SessionStore::new(Some(local), SessionOptions::default())
    }

    #[tokio::test]
    async fn test_sign_in_persists_session() {
        let client = client_with_profile().await;
        let local: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let sessions = store(local.clone());

        let response = sessions
            .sign_in(&client, &Credentials::email("ana@example.com", "s3cret"))
            .await;
        assert!(response.is_ok(), "{:?}", response.error);
        assert_eq!(response.count, 1);
        assert_eq!(response.data["user"]["username"], json!("ana"));
        assert!(response.data["user"].get("password_hash").is_none());

        let session = sessions.get_session().unwrap();
        assert!(!session.access_token.is_empty());
        let ttl = session.expires_at - Utc::now().timestamp_millis();
        assert!(ttl > Duration::hours(23).num_milliseconds());
        assert!(ttl <= Duration::hours(24).num_milliseconds());

        assert_eq!(sessions.get_user().unwrap()["email"], json!("ana@example.com"));
        assert!(local.get(SESSION_KEY).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sign_in_by_username() {
        let client = client_with_profile().await;
        let sessions = store(Arc::new(MemoryStore::new()));
        let response = sessions
            .sign_in(&client, &Credentials::username("ana", "s3cret"))
            .await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let client = client_with_profile().await;
        let sessions = store(Arc::new(MemoryStore::new()));
        let response = sessions
            .sign_in(&client, &Credentials::email("bob@example.com", "s3cret"))
            .await;
        assert_eq!(response.error, Some(DataError::AuthNotFound));
        assert!(sessions.get_session().is_none());
    }

    #[tokio::test]
    async fn test_wrong_or_missing_password() {
        let client = client_with_profile().await;
        let sessions = store(Arc::new(MemoryStore::new()));

        let response = sessions
            .sign_in(&client, &Credentials::email("ana@example.com", "guess"))
            .await;
        assert_eq!(response.error, Some(DataError::InvalidCredentials));

        let no_password = Credentials {
            email: Some("ana@example.com".to_string()),
            ..Default::default()
        };
        let response = sessions.sign_in(&client, &no_password).await;
        assert_eq!(response.error, Some(DataError::InvalidCredentials));
        assert!(sessions.get_session().is_none());
    }

    #[tokio::test]
    async fn test_unverified_lookup_when_disabled() {
        let client = client_with_profile().await;
        let options = SessionOptions {
            password_column: None,
            ..Default::default()
        };
        let sessions = SessionStore::new(Some(Arc::new(MemoryStore::new())), options);
        let credentials = Credentials {
            username: Some("ana".to_string()),
            ..Default::default()
        };
        let response = sessions.sign_in(&client, &credentials).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_missing_identifier() {
        let client = client_with_profile().await;
        let sessions = store(Arc::new(MemoryStore::new()));
        let response = sessions.sign_in(&client, &Credentials::default()).await;
        assert!(matches!(response.error, Some(DataError::InvalidBody(_))));
    }

    #[test]
    fn test_out_of_range_ttl_is_clamped() {
        let mut config = SessionConfig::default();
        config.ttl_hours = i64::MAX;
        assert_eq!(SessionOptions::from(&config).ttl, Duration::hours(MAX_TTL_HOURS));

        config.ttl_hours = -5;
        assert_eq!(SessionOptions::from(&config).ttl, Duration::hours(1));
    }

    #[tokio::test]
    async fn test_sign_out_clears_both_keys() {
        let client = client_with_profile().await;
        let dir = tempfile::tempdir().unwrap();
        let sessions = store(Arc::new(FileStore::new(dir.path())));

        sessions
            .sign_in(&client, &Credentials::email("ana@example.com", "s3cret"))
            .await;
        assert!(sessions.get_session().is_some());

        assert!(sessions.sign_out().is_ok());
        assert!(sessions.get_session().is_none());
        assert!(sessions.get_user().is_none());
    }

    #[test]
    fn test_expired_session_is_absent() {
        let local: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let expired = Session {
            user: Record::new(),
            access_token: "t".to_string(),
            expires_at: Utc::now().timestamp_millis() - 1,
        };
        local
            .set(SESSION_KEY, &serde_json::to_string(&expired).unwrap())
            .unwrap();

        assert!(store(local).get_session().is_none());
    }

    #[tokio::test]
    async fn test_without_local_store() {
        let client = client_with_profile().await;
        let sessions = SessionStore::new(None, SessionOptions::default());
        let response = sessions
            .sign_in(&client, &Credentials::email("ana@example.com", "s3cret"))
            .await;
        assert!(response.is_ok());
        assert!(sessions.get_session().is_none());
        assert!(sessions.get_user().is_none());
        assert!(sessions.sign_out().is_ok());
    }
}
