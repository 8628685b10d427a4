//! REST mirror of the board operations.
//!
//! SYSTEM CONTEXT
//! ==============
//! Everything here is a stateless counterpart to the live channel: the same
//! store functions, the same permission rules, plain request/response
//! instead of events. Tooling and seed scripts use these routes; interactive
//! clients use the websocket. Identity is self-asserted in the request body,
//! matching the live channel's cooperative trust model.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::event::{Role, ServerEvent};
use crate::services::store::{self, BoardItem, ItemKind, StoreError};
use crate::state::AppState;

// =============================================================================
// REQUEST / RESPONSE BODIES
// =============================================================================

#[derive(Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    1000
}

/// `kind` and `payload` are required; they are `Option` here so their
/// absence surfaces as a 400 from the handler instead of a 422 from the
/// extractor.
#[derive(Deserialize)]
pub struct CreateItemBody {
    pub kind: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub owner_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateItemResponse {
    pub success: bool,
    pub id: i64,
}

/// Self-asserted identity for mutating mirror routes.
#[derive(Deserialize)]
pub struct ActorBody {
    pub owner_id: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub items: i64,
}

// =============================================================================
// ITEMS
// =============================================================================

/// `GET /api/items` — ordered scan of the durable log.
pub async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListItemsQuery>,
) -> Result<Json<Vec<BoardItem>>, StatusCode> {
    let items = store::list_all(&state.pool, query.offset, query.limit)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(items))
}

/// `POST /api/items` — append one item to the log.
pub async fn create_item(
    State(state): State<AppState>,
    Json(body): Json<CreateItemBody>,
) -> Result<Json<CreateItemResponse>, StatusCode> {
    let Some(kind) = body.kind.as_deref().and_then(ItemKind::parse) else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let Some(payload) = body.payload.filter(serde_json::Value::is_object) else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let id = store::append(&state.pool, kind, &payload, body.owner_id.as_deref())
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(CreateItemResponse { success: true, id }))
}

/// `DELETE /api/items/{id}` — delete one item, fanned out to every live
/// connection. Authorizes against the stored owner; administrators bypass.
pub async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(actor): Json<ActorBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let item = store::fetch(&state.pool, id)
        .await
        .map_err(store_error_to_status)?;

    let allowed = actor.role == Role::Administrator
        || item.owner_id.as_deref() == Some(actor.owner_id.as_str());
    if !allowed {
        return Err(StatusCode::FORBIDDEN);
    }

    store::remove(&state.pool, id)
        .await
        .map_err(store_error_to_status)?;

    // Nobody on the live channel issued this, so nobody is excluded.
    state
        .registry
        .broadcast(&ServerEvent::DeleteText { id }, None)
        .await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// CLEAR
// =============================================================================

/// `POST /api/clear` — administrator-gated board wipe, mirrored to every
/// live connection.
pub async fn clear_board(
    State(state): State<AppState>,
    Json(actor): Json<ActorBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if actor.role != Role::Administrator {
        return Err(StatusCode::FORBIDDEN);
    }

    store::clear(&state.pool)
        .await
        .map_err(store_error_to_status)?;

    state.registry.broadcast(&ServerEvent::BoardCleared, None).await;
    state
        .registry
        .broadcast(
            &ServerEvent::Notification {
                message: format!("Board cleared by {}", actor.owner_id),
            },
            None,
        )
        .await;
    Ok(Json(serde_json::json!({ "ok": true })))
}

// =============================================================================
// PARTICIPANTS / HEALTH
// =============================================================================

/// `GET /api/participants` — roster snapshot, most-recently-joined first.
pub async fn list_participants(
    State(state): State<AppState>,
) -> Json<Vec<crate::event::ParticipantInfo>> {
    Json(state.registry.roster().await)
}

/// `GET /api/health` — liveness plus the stored item count.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, StatusCode> {
    let items = store::count(&state.pool)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(HealthResponse { status: "ok", items }))
}

pub(crate) fn store_error_to_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
