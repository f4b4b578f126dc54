use anyhow::{Context, Result};
use sqlx::{Executor, PgPool};
use tracing::info;

/// Migrations embedded in the binary, applied in order.
///
/// Every script must be idempotent; schema changes are additive only.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_cameras.sql",
    include_str!("sql/001_create_cameras.sql"),
)];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .with_context(|| format!("Failed to apply migration {}", name))?;

    Ok(())
}
