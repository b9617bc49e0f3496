//! PostgreSQL access
//!
//! All queries are runtime-checked (`sqlx::query`) and take a
//! `&mut PgConnection`, so the same function works on a pooled connection
//! or inside a file's transaction (`&mut *tx`).
//!
//! The schema lives in `migrations/`. The engine never applies it; operators
//! and the integration tests do.

pub mod events;
pub mod file_state;

pub use sqlx::postgres::PgPool;

use crate::config::DatabaseConfig;
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(idle_timeout) = config.idle_timeout_secs {
        options = options.idle_timeout(Duration::from_secs(idle_timeout));
    }

    let pool = options.connect(config.url()?).await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
