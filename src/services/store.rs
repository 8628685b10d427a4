//! Event log store — the durable ordered record of board items.
//!
//! DESIGN
//! ======
//! Single-writer discipline: every mutation flows through the broadcast
//! router (or its REST mirror), which persists here first and fans out
//! second. The store itself never broadcasts. Ids come from a `BIGSERIAL`
//! sequence, so they are monotonic and never reused after deletion.
//!
//! ERROR HANDLING
//! ==============
//! Storage faults surface as `StoreError::Database` and abort the operation
//! with no partial write visible; callers log and notify the originator.

use sqlx::PgPool;

use crate::event::now_ms;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(i64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl crate::event::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
        }
    }
}

/// Kind of a persisted board item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Stroke,
    Text,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stroke => "stroke",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stroke" => Some(Self::Stroke),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// A persisted whiteboard entity. Mirrors the `board_items` table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BoardItem {
    pub id: i64,
    pub kind: String,
    pub payload: serde_json::Value,
    /// Username of the creating participant. NULL for legacy/anonymous
    /// entries. Set once at insert; never reassigned on update.
    pub owner_id: Option<String>,
    /// Milliseconds since Unix epoch, stamped at insert.
    pub created_at: i64,
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Append a new item and return its assigned id.
///
/// # Errors
///
/// Returns `StoreError::Database` on a storage fault.
pub async fn append(
    pool: &PgPool,
    kind: ItemKind,
    payload: &serde_json::Value,
    owner_id: Option<&str>,
) -> Result<i64, StoreError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO board_items (kind, payload, owner_id, created_at)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(kind.as_str())
    .bind(payload)
    .bind(owner_id)
    .bind(now_ms())
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Replace the payload of an existing item. `kind`, `owner_id`, and
/// `created_at` are untouched.
///
/// # Errors
///
/// Returns `NotFound` if the id is absent, `Database` on a storage fault.
pub async fn update(pool: &PgPool, id: i64, payload: &serde_json::Value) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE board_items SET payload = $2 WHERE id = $1")
        .bind(id)
        .bind(payload)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Delete one item.
///
/// # Errors
///
/// Returns `NotFound` if the id is absent, `Database` on a storage fault.
pub async fn remove(pool: &PgPool, id: i64) -> Result<(), StoreError> {
    let result = sqlx::query("DELETE FROM board_items WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Delete all items unconditionally. Only reachable through the
/// Administrator-gated wipe paths.
///
/// # Errors
///
/// Returns `Database` on a storage fault.
pub async fn clear(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM board_items").execute(pool).await?;
    Ok(())
}

// =============================================================================
// QUERIES
// =============================================================================

/// Point lookup for one item.
///
/// # Errors
///
/// Returns `NotFound` if the id is absent, `Database` on a storage fault.
pub async fn fetch(pool: &PgPool, id: i64) -> Result<BoardItem, StoreError> {
    let row = sqlx::query_as::<_, (i64, String, serde_json::Value, Option<String>, i64)>(
        "SELECT id, kind, payload, owner_id, created_at FROM board_items WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some((id, kind, payload, owner_id, created_at)) = row else {
        return Err(StoreError::NotFound(id));
    };
    Ok(BoardItem { id, kind, payload, owner_id, created_at })
}

/// Ordered full scan: ascending by `created_at`, then `id` for ties.
///
/// # Errors
///
/// Returns `Database` on a storage fault.
pub async fn list_all(pool: &PgPool, offset: i64, limit: i64) -> Result<Vec<BoardItem>, StoreError> {
    let rows = sqlx::query_as::<_, (i64, String, serde_json::Value, Option<String>, i64)>(
        "SELECT id, kind, payload, owner_id, created_at
         FROM board_items
         ORDER BY created_at ASC, id ASC
         OFFSET $1 LIMIT $2",
    )
    .bind(offset.max(0))
    .bind(limit.max(0))
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, kind, payload, owner_id, created_at)| BoardItem {
            id,
            kind,
            payload,
            owner_id,
            created_at,
        })
        .collect())
}

/// Count stored items. Used by the health endpoint and the periodic probe.
///
/// # Errors
///
/// Returns `Database` on a storage fault.
pub async fn count(pool: &PgPool) -> Result<i64, StoreError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM board_items")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
