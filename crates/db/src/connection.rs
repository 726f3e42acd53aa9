use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use matreq_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// Opens a pool with foreign keys enforced. File databases are created on first
/// use and run in WAL mode; in-memory databases are pinned to one connection so
/// every caller sees the same schema.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let in_memory = is_in_memory(database_url);
    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let max_connections = if in_memory { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

/// Round-trips a trivial query; used by `/health` and `doctor`.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
