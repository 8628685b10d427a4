//! Session bindings — ephemeral database mirror of the live registry.
//!
//! SYSTEM CONTEXT
//! ==============
//! The in-memory registry is authoritative for "who is online". This table
//! only mirrors it for operability (inspecting live sessions via SQL) and is
//! working state, not a durable history: it is truncated at every startup.
//!
//! TRADE-OFFS
//! ==========
//! Mirror writes are fire-and-forget so a slow or unavailable database can
//! never add latency to the join/disconnect path. A failed mirror write is
//! logged and forgotten; the registry stays correct regardless.

use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::services::registry::Participant;

/// Drop all bindings. Run at startup; the table never carries state across
/// restarts.
///
/// # Errors
///
/// Returns a database error if the truncate fails.
pub async fn truncate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("TRUNCATE TABLE session_bindings").execute(pool).await?;
    Ok(())
}

/// Upsert the mirror row for a binding.
///
/// # Errors
///
/// Returns a database error if the upsert fails.
pub async fn record_binding(pool: &PgPool, participant: &Participant) -> Result<(), sqlx::Error> {
    let role = match participant.role {
        crate::event::Role::Standard => "standard",
        crate::event::Role::Administrator => "administrator",
    };
    sqlx::query(
        "INSERT INTO session_bindings (connection_id, username, role, connected_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (connection_id) DO UPDATE SET
             username = EXCLUDED.username,
             role = EXCLUDED.role,
             connected_at = EXCLUDED.connected_at",
    )
    .bind(participant.connection_id)
    .bind(&participant.username)
    .bind(role)
    .bind(participant.joined_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete the mirror row for a connection.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn delete_binding(pool: &PgPool, connection_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM session_bindings WHERE connection_id = $1")
        .bind(connection_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete mirror rows older than `cutoff_ms`. Sweep support.
///
/// # Errors
///
/// Returns a database error if the delete fails.
pub async fn purge_older_than(pool: &PgPool, cutoff_ms: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM session_bindings WHERE connected_at < $1")
        .bind(cutoff_ms)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Spawn a fire-and-forget task to record a binding.
pub fn record_fire_and_forget(pool: &PgPool, participant: &Participant) {
    let pool = pool.clone();
    let participant = participant.clone();
    tokio::spawn(async move {
        if let Err(e) = record_binding(&pool, &participant).await {
            warn!(error = %e, "session binding mirror write failed");
        }
    });
}

/// Spawn a fire-and-forget task to delete a binding.
pub fn delete_fire_and_forget(pool: &PgPool, connection_id: Uuid) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = delete_binding(&pool, connection_id).await {
            warn!(error = %e, "session binding mirror delete failed");
        }
    });
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
