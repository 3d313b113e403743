//! SQLite connection pool management.

use std::path::Path;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use velum_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default connection acquire timeout in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Connection acquire timeout duration.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the connection acquire timeout.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

/// Open (or create) the SQLite database at `path` with default configuration.
pub async fn connect(path: impl AsRef<Path>) -> Result<SqlitePool> {
    connect_with_config(path, PoolConfig::default()).await
}

/// Open (or create) the SQLite database at `path` with custom configuration,
/// then run all pending migrations.
///
/// WAL journal mode and foreign-key enforcement are configured at connection
/// time, not inside a migration: SQLite forbids changing `journal_mode`
/// inside a transaction and sqlx wraps every migration in one.
pub async fn connect_with_config(
    path: impl AsRef<Path>,
    config: PoolConfig,
) -> Result<SqlitePool> {
    let start = Instant::now();
    let path = path.as_ref();

    info!(
        subsystem = "keystore",
        component = "pool",
        op = "connect",
        db_path = %path.display(),
        max_connections = config.max_connections,
        "Opening key database"
    );

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(Error::Storage)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| Error::Storage(sqlx::Error::Migrate(Box::new(e))))?;

    info!(
        subsystem = "keystore",
        component = "pool",
        op = "ready",
        duration_ms = start.elapsed().as_millis() as u64,
        "Key database ready"
    );
    Ok(pool)
}
