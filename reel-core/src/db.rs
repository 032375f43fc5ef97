use crate::config::DatabaseConfig;
use crate::error::ReelError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// Tables and indexes backing the session store. The event log of a session
/// is the ordered scan of `session_events` by `seq`.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT UNIQUE NOT NULL,
        url TEXT NOT NULL,
        title TEXT NOT NULL,
        user_agent TEXT NOT NULL,
        viewport TEXT DEFAULT '',
        event_count INTEGER NOT NULL DEFAULT 0,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_session_id ON sessions(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_created_at ON sessions(created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_updated_at ON sessions(updated_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS session_events (
        session_id TEXT NOT NULL REFERENCES sessions(session_id),
        seq INTEGER NOT NULL,
        payload TEXT NOT NULL,
        PRIMARY KEY (session_id, seq)
    )
    "#,
];

/// Open (creating if needed) the database at `config.url` and ensure the
/// schema exists.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, ReelError> {
    let options = SqliteConnectOptions::from_str(&config.url)?;
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory pool. Every connection to `sqlite::memory:`
/// opens a fresh database, so the pool must never recycle its connection.
pub async fn create_memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()").fetch_one(pool).await?;
    Ok(row.0)
}
