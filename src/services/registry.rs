//! Session registry — the live participant set and broadcast fan-out.
//!
//! ARCHITECTURE
//! ============
//! One `SessionRegistry` is constructed at process start and injected into
//! every handler through `AppState` — never ambient global state. It owns
//! the mapping from live connection to participant identity plus each
//! connection's outbound channel, and serializes join/leave/enumerate under
//! a single `RwLock`.
//!
//! TRADE-OFFS
//! ==========
//! Delivery is best-effort `try_send` into bounded per-connection channels:
//! a slow client loses frames rather than stalling the fan-out. The lock is
//! held across channel sends only, never across socket I/O — each
//! connection's own task drains its channel onto the wire.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc};
use tracing::warn;
use uuid::Uuid;

use crate::event::{ParticipantInfo, Role, ServerEvent, now_ms};

// =============================================================================
// TYPES
// =============================================================================

/// A live connection's identity binding.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Unique per live connection; not persisted across reconnects.
    pub connection_id: Uuid,
    /// Self-declared. Duplicates across connections are permitted
    /// (multiple tabs/devices per person).
    pub username: String,
    pub role: Role,
    /// Milliseconds since Unix epoch.
    pub joined_at: i64,
    /// Monotonic insertion counter; breaks `joined_at` ties in the roster.
    seq: u64,
}

impl Participant {
    #[must_use]
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo { username: self.username.clone(), role: self.role, joined_at: self.joined_at }
    }
}

#[cfg(test)]
impl SessionRegistry {
    /// Backdate a binding's join time to simulate a stale connection.
    pub(crate) async fn backdate(&self, connection_id: Uuid, joined_at: i64) {
        let mut inner = self.inner.write().await;
        if let Some(conn) = inner.get_mut(&connection_id) {
            conn.participant.joined_at = joined_at;
        }
    }
}

#[cfg(test)]
impl Participant {
    /// Build a standalone participant without going through the registry.
    pub(crate) fn for_tests(username: &str, role: Role) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            username: username.to_owned(),
            role,
            joined_at: now_ms(),
            seq: 0,
        }
    }
}

struct Connection {
    participant: Participant,
    tx: mpsc::Sender<ServerEvent>,
}

/// Process-wide registry of live connections.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Connection>>>,
    seq: Arc<AtomicU64>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(HashMap::new())), seq: Arc::new(AtomicU64::new(0)) }
    }

    /// Bind a participant to a connection. Upserts: a prior binding for the
    /// same `connection_id` (e.g. a re-join on the same socket) is replaced,
    /// so the map never holds two entries per connection.
    pub async fn join(
        &self,
        connection_id: Uuid,
        username: &str,
        role: Role,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Participant {
        let participant = Participant {
            connection_id,
            username: username.to_owned(),
            role,
            joined_at: now_ms(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let mut inner = self.inner.write().await;
        inner.insert(connection_id, Connection { participant: participant.clone(), tx });
        participant
    }

    /// Remove a binding. No-op if absent; returns the removed participant.
    pub async fn leave(&self, connection_id: Uuid) -> Option<Participant> {
        let mut inner = self.inner.write().await;
        inner.remove(&connection_id).map(|c| c.participant)
    }

    /// Look up the participant bound to a connection.
    pub async fn get(&self, connection_id: Uuid) -> Option<Participant> {
        let inner = self.inner.read().await;
        inner.get(&connection_id).map(|c| c.participant.clone())
    }

    /// Point-in-time snapshot of active participants, most-recently-joined
    /// first (ties broken by insertion order).
    pub async fn list_active(&self) -> Vec<Participant> {
        let inner = self.inner.read().await;
        let mut participants: Vec<Participant> =
            inner.values().map(|c| c.participant.clone()).collect();
        participants.sort_by(|a, b| b.seq.cmp(&a.seq));
        participants
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drop bindings older than `max_age_ms`. Leak-prevention backstop for
    /// connections whose disconnect cleanup never ran.
    pub async fn purge_stale(&self, max_age_ms: i64) -> Vec<Participant> {
        let cutoff = now_ms() - max_age_ms;
        let mut inner = self.inner.write().await;
        let stale: Vec<Uuid> = inner
            .iter()
            .filter(|(_, c)| c.participant.joined_at < cutoff)
            .map(|(id, _)| *id)
            .collect();
        stale
            .into_iter()
            .filter_map(|id| inner.remove(&id).map(|c| c.participant))
            .collect()
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

impl SessionRegistry {
    /// Broadcast an event to every live connection, optionally excluding one
    /// (sender-exclusive fan-out).
    pub async fn broadcast(&self, event: &ServerEvent, exclude: Option<Uuid>) {
        let inner = self.inner.read().await;
        for (connection_id, conn) in inner.iter() {
            if exclude == Some(*connection_id) {
                continue;
            }
            if conn.tx.try_send(event.clone()).is_err() {
                warn!(%connection_id, "outbound channel full or closed; dropping event");
            }
        }
    }

    /// Current roster as published to clients.
    pub async fn roster(&self) -> Vec<ParticipantInfo> {
        self.list_active()
            .await
            .iter()
            .map(Participant::info)
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
