//! Database Layer with Connection Pooling
//!
//! SQLite persistence for feature settings and expiring diagnostics:
//! - Connection pooling via r2d2 for concurrent access
//! - Version-tracked migrations
//! - WAL mode for concurrent request handlers

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{SettingsRepository, TransientStore};
use crate::types::{QuillError, Result, ResultExt};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS transients (
    key         TEXT PRIMARY KEY,
    value       TEXT NOT NULL,
    expires_at  INTEGER NOT NULL
);
"#;

/// Current schema version for migration tracking
const SCHEMA_VERSION: u32 = 1;

struct Migration {
    version: u32,
    description: &'static str,
    up: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Index transient expiry",
    up: "CREATE INDEX IF NOT EXISTS idx_transients_expires ON transients(expires_at)",
}];

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to maintain
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    const MIN_POOL_SIZE: u32 = 2;
    const MAX_POOL_SIZE: u32 = 16;

    /// One connection per core, clamped
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);
        cores.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    pub fn auto() -> Self {
        let max_size = Self::optimal_pool_size();
        Self {
            max_size,
            min_idle: (max_size / 4).max(1),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.pool.state();
        f.debug_struct("Database")
            .field("connections", &state.connections)
            .field("idle", &state.idle_connections)
            .finish()
    }
}

impl Database {
    /// Open and initialize a database file, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .build(manager)
            .map_err(|e| QuillError::Storage(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| QuillError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        let db = Self { pool };
        db.initialize()?;
        Ok(db)
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            QuillError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;
        drop(conn);
        self.migrate()
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;

        let current_version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        for migration in MIGRATIONS {
            if migration.version > current_version {
                conn.execute_batch(migration.up).with_context_fn(|| {
                    format!(
                        "Failed to apply migration {}: {}",
                        migration.version, migration.description
                    )
                })?;

                tracing::info!(
                    "Applied migration {}: {}",
                    migration.version,
                    migration.description
                );
            }
        }

        if current_version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to update schema version")?;
        }

        Ok(())
    }

    /// Stored option keys, sorted
    pub fn option_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM settings ORDER BY key")
            .with_context("Failed to prepare option query")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context("Failed to list options")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to read option row")?;
        Ok(keys)
    }

    /// Delete expired transients; returns how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM transients WHERE expires_at <= ?1",
            params![now_ts()],
        )
        .with_context("Failed to purge transients")
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

impl SettingsRepository for Database {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context_fn(|| format!("Failed to load option {}", key))?;

        raw.map(|s| serde_json::from_str(&s).map_err(QuillError::from))
            .transpose()
    }

    fn save(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value.to_string(), chrono::Utc::now().to_rfc3339()],
        )
        .with_context_fn(|| format!("Failed to save option {}", key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", params![key])
            .with_context_fn(|| format!("Failed to delete option {}", key))?;
        Ok(())
    }
}

impl TransientStore for Database {
    fn set_transient(&self, key: &str, value: &Value, ttl: Duration) -> Result<()> {
        let conn = self.conn()?;
        let expires_at = now_ts() + ttl.as_secs() as i64;
        conn.execute(
            "INSERT INTO transients (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value.to_string(), expires_at],
        )
        .with_context_fn(|| format!("Failed to set transient {}", key))?;
        Ok(())
    }

    fn get_transient(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM transients WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .with_context_fn(|| format!("Failed to read transient {}", key))?;

        match row {
            Some((raw, expires_at)) if expires_at > now_ts() => {
                Ok(Some(serde_json::from_str(&raw)?))
            }
            Some(_) => {
                conn.execute("DELETE FROM transients WHERE key = ?1", params![key])
                    .with_context("Failed to drop expired transient")?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn delete_transient(&self, key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM transients WHERE key = ?1", params![key])
            .with_context_fn(|| format!("Failed to delete transient {}", key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.option_keys().unwrap().is_empty());
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let doc = json!({"status": "1", "provider": "xai_grok"});

        db.save("quillmind_feature_title_generation", &doc).unwrap();
        assert_eq!(
            db.load("quillmind_feature_title_generation").unwrap(),
            Some(doc)
        );

        db.save("quillmind_feature_title_generation", &json!({"status": "0"}))
            .unwrap();
        assert_eq!(
            db.load("quillmind_feature_title_generation").unwrap(),
            Some(json!({"status": "0"}))
        );

        db.delete("quillmind_feature_title_generation").unwrap();
        assert!(db.load("quillmind_feature_title_generation").unwrap().is_none());
    }

    #[test]
    fn test_transients_expire() {
        let db = Database::open_in_memory().unwrap();
        db.set_transient("fresh", &json!({"a": 1}), Duration::from_secs(3600))
            .unwrap();
        db.set_transient("stale", &json!(1), Duration::ZERO).unwrap();

        assert_eq!(db.get_transient("fresh").unwrap(), Some(json!({"a": 1})));
        assert_eq!(db.get_transient("stale").unwrap(), None);
        assert_eq!(db.purge_expired().unwrap(), 0);

        db.delete_transient("fresh").unwrap();
        assert_eq!(db.get_transient("fresh").unwrap(), None);
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("quillmind.db");

        {
            let db = Database::open(&path).unwrap();
            db.save("k", &json!([1, 2])).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.load("k").unwrap(), Some(json!([1, 2])));
        assert_eq!(db.option_keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_pool_config_bounds() {
        let size = PoolConfig::optimal_pool_size();
        assert!((PoolConfig::MIN_POOL_SIZE..=PoolConfig::MAX_POOL_SIZE).contains(&size));
        assert!(PoolConfig::auto().min_idle >= 1);
    }
}
