use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of forward migrations shipped in this build.
pub fn bundled_count() -> usize {
    MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count()
}

/// Number of migrations recorded as applied. A database that was never
/// migrated reports zero.
pub async fn applied_count(pool: &DbPool) -> Result<usize, sqlx::Error> {
    let (tracked,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if tracked == 0 {
        return Ok(0);
    }

    let (applied,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok(usize::try_from(applied).unwrap_or_default())
}
