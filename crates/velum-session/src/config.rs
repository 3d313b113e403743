//! Runtime configuration for the messaging session.

use std::path::PathBuf;

/// Default SQLite database file, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "velum.db";

/// Configuration for [`crate::EncryptionSession`] backends.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Path to the SQLite key database.
    pub db_path: PathBuf,
    /// Directory holding legacy flat-file keys, if migration is wanted.
    pub legacy_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            legacy_dir: None,
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VELUM_DB_PATH` | `velum.db` | SQLite key database file |
    /// | `VELUM_LEGACY_DIR` | unset | Legacy flat-file key directory to migrate from |
    pub fn from_env() -> Self {
        let db_path = std::env::var("VELUM_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let legacy_dir = std::env::var("VELUM_LEGACY_DIR").ok().map(PathBuf::from);

        Self {
            db_path,
            legacy_dir,
        }
    }

    /// Set the key database path.
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Set the legacy key directory.
    pub fn with_legacy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.legacy_dir = Some(dir.into());
        self
    }
}
