use crate::config::DatabaseConfig;
use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod migrations;
pub mod models;
pub mod repositories;

/// Open the connection pool, applying migrations when `auto_migrate` is set
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<PgPool>> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.url)
        .await
        .context("Failed to connect to database")?;

    info!(
        "Connected to PostgreSQL (pool size {})",
        config.max_connections
    );

    if config.auto_migrate {
        migrations::run_migrations(&pool).await?;
    }

    Ok(Arc::new(pool))
}
