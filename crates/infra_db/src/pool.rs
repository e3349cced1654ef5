//! Connection pool and schema migrations
//!
//! The batch jobs hold one transaction per chunk and take row locks on the
//! invoices, stock keys and serials they rewrite, so every session opened
//! here carries a lock timeout and a statement timeout. A job that waits on
//! a row held by an interactive user fails its chunk instead of hanging.

use std::str::FromStr;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::info;

use crate::error::DatabaseError;

/// Type alias for the PostgreSQL connection pool
pub type DatabasePool = PgPool;

/// Local development database
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/dme";

/// Session name reported in `pg_stat_activity`
pub const DEFAULT_APPLICATION_NAME: &str = "dme-core";

/// Pool and session settings
///
/// # Example
///
/// ```rust
/// use infra_db::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("postgres://localhost/dme")
///     .application_name("dme-jobs")
///     .lock_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_connections, 4);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub application_name: String,
    /// Jobs run their chunks one after another, so a handful is plenty
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Longest wait on a row lock before the statement fails
    pub lock_timeout: Duration,
    /// Longest a single statement may run
    pub statement_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            lock_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(5 * 60),
        }
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Parses the URL and applies the session settings
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::ConnectionFailed` if the URL does not parse
    pub fn connect_options(&self) -> Result<PgConnectOptions, DatabaseError> {
        let options = PgConnectOptions::from_str(&self.url)
            .map_err(|e| DatabaseError::ConnectionFailed(format!("invalid database url: {e}")))?;
        Ok(options
            .application_name(&self.application_name)
            .options(self.session_settings()))
    }

    /// Server settings sent with every new session, in milliseconds
    fn session_settings(&self) -> [(&'static str, String); 2] {
        [
            ("lock_timeout", self.lock_timeout.as_millis().to_string()),
            ("statement_timeout", self.statement_timeout.as_millis().to_string()),
        ]
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATABASE_URL)
    }
}

/// Opens a pool with the configured session settings
///
/// # Errors
///
/// Returns `DatabaseError::ConnectionFailed` if the URL is invalid or the
/// first connection cannot be established
pub async fn create_pool(config: DatabaseConfig) -> Result<DatabasePool, DatabaseError> {
    let options = config.connect_options()?;
    info!(
        application_name = %config.application_name,
        max_connections = config.max_connections,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        "Opening database pool"
    );

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
}

/// Applies the embedded schema migrations
///
/// # Errors
///
/// Returns `DatabaseError::MigrationFailed` if a migration cannot be applied
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Schema is up to date");
    Ok(())
}
