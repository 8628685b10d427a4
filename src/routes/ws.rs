//! WebSocket handler — the broadcast router.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection ID and enters a `select!` loop:
//! - Incoming client events → parse + run through the state machine
//! - Fan-out events from peers → forward to this client
//!
//! Event handling is a single transition function over the tagged
//! `ClientEvent` union, so the whole table is testable without a live
//! socket. Handlers persist first, fan out second; the registry owns
//! delivery and never holds a lock across socket I/O.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → `Anonymous` (connected, no participant binding)
//! 2. `join` → `Active`: registry binding, roster republish, log replay
//! 3. Draw/text/clear events mutate the store and fan out
//! 4. Close → `Closed`: deregister once, notify the remaining participants

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::event::{ClientEvent, Role, ServerEvent, StrokePayload, TextPayload, now_ms};
use crate::services::registry::Participant;
use crate::services::store::{self, ItemKind, StoreError};
use crate::services::{maintenance, permission, session};
use crate::state::AppState;

/// Outbound queue depth per connection. A client that falls further behind
/// than this starts losing frames instead of stalling the fan-out.
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

const DEFAULT_REPLAY_PAGE_SIZE: i64 = 500;

// =============================================================================
// CONNECTION PHASE
// =============================================================================

/// Per-connection state machine position. `Closed` is implicit: the
/// connection task has exited and the binding is gone.
pub(crate) enum Phase {
    /// Connected, join handshake not yet completed.
    Anonymous,
    /// Bound to a participant identity.
    Active(Participant),
}

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /api/ws` — upgrade to the live event channel. Identity is
/// self-asserted in the subsequent `join` event; there is no ticket or
/// cookie handshake by design.
pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();

    // Per-connection channel for receiving fan-out events from peers.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CHANNEL_CAPACITY);

    let mut phase = Phase::Anonymous;
    info!(%connection_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies =
                            process_text(&state, &mut phase, connection_id, &client_tx, &text).await;
                        let mut failed = false;
                        for event in replies {
                            if send_event(&mut socket, connection_id, &event).await.is_err() {
                                failed = true;
                                break;
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(event) = client_rx.recv() => {
                if send_event(&mut socket, connection_id, &event).await.is_err() {
                    break;
                }
            }
        }
    }

    // Closed transition: runs exactly once, after the loop exits. Any event
    // still queued for this connection is dropped with the channel.
    if let Phase::Active(participant) = phase {
        disconnect(&state, &participant).await;
    }
    info!(%connection_id, "ws: client disconnected");
}

// =============================================================================
// EVENT DISPATCH
// =============================================================================

/// Parse one inbound text frame and run it through the state machine.
/// Returned events go to the sender; peer/global fan-out happens inside.
pub(crate) async fn process_text(
    state: &AppState,
    phase: &mut Phase,
    connection_id: Uuid,
    client_tx: &mpsc::Sender<ServerEvent>,
    text: &str,
) -> Vec<ServerEvent> {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(ev) => ev,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: invalid inbound event");
            return vec![ServerEvent::error("E_BAD_EVENT", format!("invalid event: {e}"))];
        }
    };
    process_event(state, phase, connection_id, client_tx, event).await
}

/// The transition function for the per-connection state machine.
pub(crate) async fn process_event(
    state: &AppState,
    phase: &mut Phase,
    connection_id: Uuid,
    client_tx: &mpsc::Sender<ServerEvent>,
    event: ClientEvent,
) -> Vec<ServerEvent> {
    // Join is legal in both phases: from Anonymous it completes the
    // handshake, from Active it rebinds (upsert in the registry).
    if let ClientEvent::Join { username, role } = event {
        return handle_join(state, phase, connection_id, client_tx, &username, role).await;
    }

    let participant = match &*phase {
        // Anything but join before the handshake completes is dropped
        // silently: the client has not finished joining.
        Phase::Anonymous => {
            debug!(%connection_id, "ws: event before join dropped");
            return vec![];
        }
        Phase::Active(participant) => participant.clone(),
    };
    dispatch_active(state, &participant, event).await
}

async fn dispatch_active(
    state: &AppState,
    participant: &Participant,
    event: ClientEvent,
) -> Vec<ServerEvent> {
    match event {
        // Handled one level up; it rebinds the phase.
        ClientEvent::Join { .. } => vec![],
        ClientEvent::Draw { stroke } => handle_draw(state, participant, stroke).await,
        ClientEvent::CreateText { text } => handle_create_text(state, participant, text).await,
        ClientEvent::UpdateText { id, content, owner } => {
            handle_update_text(state, participant, id, &content, owner.as_deref()).await
        }
        ClientEvent::MoveText { id, x, y, owner } => {
            handle_move_text(state, participant, id, x, y, owner.as_deref()).await
        }
        ClientEvent::DeleteText { id } => handle_delete_text(state, participant, id).await,
        ClientEvent::Clear => handle_clear(state, participant).await,
    }
}

// =============================================================================
// JOIN / DISCONNECT
// =============================================================================

async fn handle_join(
    state: &AppState,
    phase: &mut Phase,
    connection_id: Uuid,
    client_tx: &mpsc::Sender<ServerEvent>,
    username: &str,
    role: Role,
) -> Vec<ServerEvent> {
    let username = username.trim();
    if username.is_empty() {
        warn!(%connection_id, "ws: join with empty username dropped");
        return vec![];
    }

    // Upsert: a re-join on the same socket replaces the prior binding.
    let participant = state
        .registry
        .join(connection_id, username, role, client_tx.clone())
        .await;
    session::record_fire_and_forget(&state.pool, &participant);
    info!(%connection_id, username, ?role, "ws: participant joined");

    state
        .registry
        .broadcast(
            &ServerEvent::ParticipantJoined { username: username.to_owned(), role },
            Some(connection_id),
        )
        .await;

    // Everyone gets the refreshed roster, the new participant included.
    let roster = state.registry.roster().await;
    state
        .registry
        .broadcast(&ServerEvent::ActiveParticipants { participants: roster }, None)
        .await;

    *phase = Phase::Active(participant);

    // Replay the durable log so the late joiner reconstructs prior state.
    match replay_log(state).await {
        Ok(events) => events,
        Err(e) => {
            error!(%connection_id, error = %e, "ws: log replay failed");
            vec![ServerEvent::error("E_DATABASE", "failed to load board state")]
        }
    }
}

/// Read the whole ordered log back as plain draw/text events. Paging bounds
/// each query and row buffer; the resulting event list still spans the full
/// board.
async fn replay_log(state: &AppState) -> Result<Vec<ServerEvent>, StoreError> {
    let page_size = maintenance::env_parse("REPLAY_PAGE_SIZE", DEFAULT_REPLAY_PAGE_SIZE).max(1);
    let mut events = Vec::new();
    let mut offset = 0_i64;

    loop {
        let page = store::list_all(&state.pool, offset, page_size).await?;
        let page_len = page.len();
        for item in page {
            match ItemKind::parse(&item.kind) {
                Some(ItemKind::Stroke) => {
                    let Ok(stroke) = serde_json::from_value::<StrokePayload>(item.payload) else {
                        warn!(id = item.id, "replay: malformed stroke payload skipped");
                        continue;
                    };
                    events.push(ServerEvent::Draw {
                        id: item.id,
                        stroke,
                        by: item.owner_id.unwrap_or_default(),
                        ts: item.created_at,
                    });
                }
                Some(ItemKind::Text) => {
                    let Ok(text) = serde_json::from_value::<TextPayload>(item.payload) else {
                        warn!(id = item.id, "replay: malformed text payload skipped");
                        continue;
                    };
                    events.push(ServerEvent::Text {
                        id: item.id,
                        text,
                        by: item.owner_id,
                        ts: item.created_at,
                    });
                }
                None => warn!(id = item.id, kind = %item.kind, "replay: unknown item kind skipped"),
            }
        }
        if page_len < usize::try_from(page_size).unwrap_or(usize::MAX) {
            return Ok(events);
        }
        offset += page_size;
    }
}

async fn disconnect(state: &AppState, participant: &Participant) {
    // The sweep may already have purged (and announced) this binding.
    let Some(removed) = state.registry.leave(participant.connection_id).await else {
        return;
    };
    session::delete_fire_and_forget(&state.pool, removed.connection_id);

    state
        .registry
        .broadcast(&ServerEvent::ParticipantLeft { username: removed.username.clone() }, None)
        .await;
    let roster = state.registry.roster().await;
    state
        .registry
        .broadcast(&ServerEvent::ActiveParticipants { participants: roster }, None)
        .await;
}

// =============================================================================
// DRAW / TEXT HANDLERS
// =============================================================================

async fn handle_draw(
    state: &AppState,
    participant: &Participant,
    stroke: StrokePayload,
) -> Vec<ServerEvent> {
    if stroke.points.is_empty() {
        return vec![ServerEvent::error("E_BAD_EVENT", "stroke requires at least one point")];
    }

    let Ok(payload) = serde_json::to_value(&stroke) else {
        return vec![ServerEvent::error("E_BAD_EVENT", "unserializable stroke")];
    };
    match store::append(&state.pool, ItemKind::Stroke, &payload, Some(&participant.username)).await {
        Ok(id) => {
            // Sender-exclusive: the sender already has authoritative local state.
            state
                .registry
                .broadcast(
                    &ServerEvent::Draw {
                        id,
                        stroke,
                        by: participant.username.clone(),
                        ts: now_ms(),
                    },
                    Some(participant.connection_id),
                )
                .await;
            vec![]
        }
        Err(e) => storage_fault(participant, &e),
    }
}

async fn handle_create_text(
    state: &AppState,
    participant: &Participant,
    mut text: TextPayload,
) -> Vec<ServerEvent> {
    // Ownership is self-declared at creation and fixed for the item's
    // lifetime; absent, it defaults to the creator.
    let owner = text
        .owner
        .clone()
        .unwrap_or_else(|| participant.username.clone());
    text.owner = Some(owner.clone());

    let Ok(payload) = serde_json::to_value(&text) else {
        return vec![ServerEvent::error("E_BAD_EVENT", "unserializable text payload")];
    };
    match store::append(&state.pool, ItemKind::Text, &payload, Some(&owner)).await {
        Ok(id) => {
            state
                .registry
                .broadcast(
                    &ServerEvent::Text {
                        id,
                        text,
                        by: Some(participant.username.clone()),
                        ts: now_ms(),
                    },
                    Some(participant.connection_id),
                )
                .await;
            vec![]
        }
        Err(e) => storage_fault(participant, &e),
    }
}

async fn handle_update_text(
    state: &AppState,
    participant: &Participant,
    id: i64,
    content: &str,
    declared_owner: Option<&str>,
) -> Vec<ServerEvent> {
    match mutate_text(state, participant, id, declared_owner, |map| {
        map.insert("content".into(), json!(content));
    })
    .await
    {
        Ok(()) => {
            state
                .registry
                .broadcast(
                    &ServerEvent::UpdateText { id, content: content.to_owned() },
                    Some(participant.connection_id),
                )
                .await;
            vec![]
        }
        Err(e) => mutate_fault(participant, &e),
    }
}

async fn handle_move_text(
    state: &AppState,
    participant: &Participant,
    id: i64,
    x: f64,
    y: f64,
    declared_owner: Option<&str>,
) -> Vec<ServerEvent> {
    match mutate_text(state, participant, id, declared_owner, |map| {
        map.insert("x".into(), json!(x));
        map.insert("y".into(), json!(y));
    })
    .await
    {
        Ok(()) => {
            state
                .registry
                .broadcast(&ServerEvent::MoveText { id, x, y }, Some(participant.connection_id))
                .await;
            vec![]
        }
        Err(e) => mutate_fault(participant, &e),
    }
}

async fn handle_delete_text(state: &AppState, participant: &Participant, id: i64) -> Vec<ServerEvent> {
    // Delete authorizes against the stored owner only; there is no declared
    // owner field on the wire for deletes.
    let item = match store::fetch(&state.pool, id).await {
        Ok(item) => item,
        Err(e) => return mutate_fault(participant, &MutateError::Store(e)),
    };
    if !permission::can_mutate(participant, item.owner_id.as_deref()) {
        return vec![not_authorized()];
    }

    match store::remove(&state.pool, id).await {
        Ok(()) => {
            state
                .registry
                .broadcast(&ServerEvent::DeleteText { id }, Some(participant.connection_id))
                .await;
            vec![]
        }
        Err(e) => mutate_fault(participant, &MutateError::Store(e)),
    }
}

enum MutateError {
    Forbidden,
    Store(StoreError),
}

/// Authorize and apply an in-place payload merge on a text item.
///
/// Authorization runs against the stored `owner_id`; the request's declared
/// owner only stands in for legacy items persisted without one. Merges are
/// last-write-wins: concurrent writers race freely, whichever update lands
/// last sticks, and no version vector arbitrates.
async fn mutate_text(
    state: &AppState,
    participant: &Participant,
    id: i64,
    declared_owner: Option<&str>,
    apply: impl FnOnce(&mut serde_json::Map<String, serde_json::Value>),
) -> Result<(), MutateError> {
    let item = store::fetch(&state.pool, id).await.map_err(MutateError::Store)?;
    if ItemKind::parse(&item.kind) != Some(ItemKind::Text) {
        return Err(MutateError::Store(StoreError::NotFound(id)));
    }

    let owner = item.owner_id.as_deref().or(declared_owner);
    if !permission::can_mutate(participant, owner) {
        return Err(MutateError::Forbidden);
    }

    let mut payload = item.payload;
    if let Some(map) = payload.as_object_mut() {
        apply(map);
    }
    store::update(&state.pool, id, &payload)
        .await
        .map_err(MutateError::Store)
}

// =============================================================================
// CLEAR HANDLER
// =============================================================================

async fn handle_clear(state: &AppState, participant: &Participant) -> Vec<ServerEvent> {
    if !permission::can_clear(participant) {
        info!(username = %participant.username, "ws: clear denied for non-administrator");
        return vec![ServerEvent::ClearError {
            message: "only administrators may clear the board".into(),
        }];
    }

    match store::clear(&state.pool).await {
        Ok(()) => {
            // Full reset: every client wipes its canvas, originator included.
            state.registry.broadcast(&ServerEvent::BoardCleared, None).await;
            state
                .registry
                .broadcast(
                    &ServerEvent::Notification {
                        message: format!("Board cleared by {}", participant.username),
                    },
                    Some(participant.connection_id),
                )
                .await;
            vec![]
        }
        Err(e) => {
            error!(error = %e, "ws: board clear failed");
            vec![ServerEvent::ClearError { message: "board clear failed".into() }]
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn not_authorized() -> ServerEvent {
    ServerEvent::error("E_FORBIDDEN", "not authorized to edit this item")
}

/// Storage faults degrade gracefully: log centrally, tell the originator,
/// keep the process alive. No detail beyond the code leaks to the client.
fn storage_fault(participant: &Participant, err: &StoreError) -> Vec<ServerEvent> {
    error!(username = %participant.username, error = %err, "ws: storage fault");
    vec![ServerEvent::error("E_DATABASE", "operation failed, please retry")]
}

/// NotFound goes back verbatim (it is actionable for the client); database
/// failures degrade to a generic storage fault.
fn mutate_fault(participant: &Participant, err: &MutateError) -> Vec<ServerEvent> {
    match err {
        MutateError::Forbidden => vec![not_authorized()],
        MutateError::Store(e @ StoreError::NotFound(_)) => vec![ServerEvent::error_from(e)],
        MutateError::Store(e) => storage_fault(participant, e),
    }
}

async fn send_event(socket: &mut WebSocket, connection_id: Uuid, event: &ServerEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(%connection_id, error = %e, "ws: failed to serialize event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
