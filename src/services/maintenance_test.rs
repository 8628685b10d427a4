use super::*;
use crate::event::Role;
use crate::state::test_helpers;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

#[test]
fn env_parse_falls_back_on_missing_or_garbage() {
    assert_eq!(env_parse("INKBOARD_TEST_UNSET_VAR", 42_u64), 42);

    // SAFETY: test-local variable name, single-threaded mutation.
    unsafe { std::env::set_var("INKBOARD_TEST_GARBAGE_VAR", "not-a-number") };
    assert_eq!(env_parse("INKBOARD_TEST_GARBAGE_VAR", 7_i64), 7);
    unsafe { std::env::remove_var("INKBOARD_TEST_GARBAGE_VAR") };
}

#[tokio::test]
async fn sweep_with_no_stale_bindings_is_silent() {
    let state = test_helpers::test_app_state();
    let (tx, mut rx) = mpsc::channel(8);
    state
        .registry
        .join(Uuid::new_v4(), "fresh", Role::Standard, tx)
        .await;

    sweep_stale_sessions(&state, 60_000).await;

    assert_eq!(state.registry.len().await, 1);
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast from a clean sweep"
    );
}

#[tokio::test]
async fn sweep_purges_stale_and_republishes_roster() {
    let state = test_helpers::test_app_state();
    let ghost_conn = Uuid::new_v4();
    let (tx_ghost, _rx_ghost) = mpsc::channel(8);
    let (tx_live, mut rx_live) = mpsc::channel(8);
    state
        .registry
        .join(ghost_conn, "ghost", Role::Standard, tx_ghost)
        .await;
    state
        .registry
        .join(Uuid::new_v4(), "alive", Role::Standard, tx_live)
        .await;
    state.registry.backdate(ghost_conn, 0).await;

    sweep_stale_sessions(&state, 60_000).await;

    assert_eq!(state.registry.len().await, 1);
    assert!(state.registry.get(ghost_conn).await.is_none());

    let left = timeout(Duration::from_millis(200), rx_live.recv())
        .await
        .expect("participantLeft timed out")
        .expect("channel closed");
    assert_eq!(left, crate::event::ServerEvent::ParticipantLeft { username: "ghost".into() });

    let roster = timeout(Duration::from_millis(200), rx_live.recv())
        .await
        .expect("roster timed out")
        .expect("channel closed");
    let crate::event::ServerEvent::ActiveParticipants { participants } = roster else {
        panic!("expected activeParticipants");
    };
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].username, "alive");
}
