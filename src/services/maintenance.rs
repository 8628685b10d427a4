//! Maintenance service — background sweep and health probe.
//!
//! DESIGN
//! ======
//! Two best-effort background tasks, both spawned at startup and both off
//! the main event path:
//! - an hourly sweep that purges participant bindings older than 24h, a
//!   leak-prevention backstop for connections whose disconnect cleanup
//!   never ran;
//! - a five-minute health probe that counts stored items for observability.
//!
//! ERROR HANDLING
//! ==============
//! Failures are logged and the next tick retries. Neither task can crash
//! the process or block a connection task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::event::ServerEvent;
use crate::services::{session, store};
use crate::state::AppState;

const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_SESSION_MAX_AGE_SECS: i64 = 86_400;
const DEFAULT_HEALTH_PROBE_INTERVAL_SECS: u64 = 300;

/// Parse an environment variable, falling back to a default.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Spawn the stale-binding sweep. Returns a handle for shutdown.
pub fn spawn_session_sweep(state: AppState) -> JoinHandle<()> {
    let interval_secs = env_parse("SESSION_SWEEP_INTERVAL_SECS", DEFAULT_SESSION_SWEEP_INTERVAL_SECS);
    let max_age_secs = env_parse("SESSION_MAX_AGE_SECS", DEFAULT_SESSION_MAX_AGE_SECS);
    info!(interval_secs, max_age_secs, "session sweep configured");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_stale_sessions(&state, max_age_secs * 1000).await;
        }
    })
}

/// One sweep pass: purge the registry, mirror the purge to the bindings
/// table, and republish the roster if anything changed.
pub async fn sweep_stale_sessions(state: &AppState, max_age_ms: i64) {
    let purged = state.registry.purge_stale(max_age_ms).await;
    if purged.is_empty() {
        return;
    }

    warn!(count = purged.len(), "purged stale participant bindings");

    // Mirror the purge off the hot path; the registry is already correct.
    let pool = state.pool.clone();
    let cutoff = crate::event::now_ms() - max_age_ms;
    tokio::spawn(async move {
        if let Err(e) = session::purge_older_than(&pool, cutoff).await {
            warn!(error = %e, "session binding purge failed");
        }
    });

    for participant in &purged {
        state
            .registry
            .broadcast(
                &ServerEvent::ParticipantLeft { username: participant.username.clone() },
                None,
            )
            .await;
    }
    let roster = state.registry.roster().await;
    state
        .registry
        .broadcast(&ServerEvent::ActiveParticipants { participants: roster }, None)
        .await;
}

/// Spawn the periodic health probe. Returns a handle for shutdown.
pub fn spawn_health_probe(state: AppState) -> JoinHandle<()> {
    let interval_secs = env_parse("HEALTH_PROBE_INTERVAL_SECS", DEFAULT_HEALTH_PROBE_INTERVAL_SECS);
    info!(interval_secs, "health probe configured");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store::count(&state.pool).await {
                Ok(items) => {
                    let participants = state.registry.len().await;
                    info!(items, participants, "health probe");
                }
                Err(e) => error!(error = %e, "health probe failed"),
            }
        }
    })
}

#[cfg(test)]
#[path = "maintenance_test.rs"]
mod tests;
