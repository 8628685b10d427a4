//! Database initialization and migration runner.
//!
//! SYSTEM CONTEXT
//! ==============
//! Startup uses this module to create the shared SQLx pool and enforce schema
//! migrations before accepting websocket/API traffic. The session-bindings
//! table is ephemeral working state, so it is truncated here on every boot.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::services::{maintenance, session};

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Initialize the `PostgreSQL` connection pool, run migrations, and reset
/// the ephemeral session mirror.
///
/// # Errors
///
/// Returns an error if the connection, migrations, or reset fail.
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(maintenance::env_parse("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS))
        .connect(database_url)
        .await?;

    sqlx::migrate!("src/db/migrations").run(&pool).await?;
    session::truncate(&pool).await?;

    Ok(pool)
}
