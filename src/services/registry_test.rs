use super::*;

fn channel() -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
    mpsc::channel(8)
}

#[tokio::test]
async fn join_and_get() {
    let registry = SessionRegistry::new();
    let id = Uuid::new_v4();
    let (tx, _rx) = channel();

    let p = registry.join(id, "ann", Role::Standard, tx).await;
    assert_eq!(p.connection_id, id);
    assert_eq!(p.username, "ann");
    assert!(p.joined_at > 0);

    let found = registry.get(id).await.unwrap();
    assert_eq!(found.username, "ann");
    assert_eq!(found.role, Role::Standard);
}

#[tokio::test]
async fn join_upserts_existing_connection() {
    let registry = SessionRegistry::new();
    let id = Uuid::new_v4();
    let (tx_a, _rx_a) = channel();
    let (tx_b, _rx_b) = channel();

    registry.join(id, "ann", Role::Standard, tx_a).await;
    registry.join(id, "ann2", Role::Administrator, tx_b).await;

    // Never two entries for the same connection.
    assert_eq!(registry.len().await, 1);
    let p = registry.get(id).await.unwrap();
    assert_eq!(p.username, "ann2");
    assert_eq!(p.role, Role::Administrator);
}

#[tokio::test]
async fn duplicate_usernames_across_connections_are_permitted() {
    let registry = SessionRegistry::new();
    let (tx_a, _rx_a) = channel();
    let (tx_b, _rx_b) = channel();

    registry.join(Uuid::new_v4(), "ann", Role::Standard, tx_a).await;
    registry.join(Uuid::new_v4(), "ann", Role::Standard, tx_b).await;

    assert_eq!(registry.len().await, 2);
}

#[tokio::test]
async fn leave_is_noop_when_absent() {
    let registry = SessionRegistry::new();
    assert!(registry.leave(Uuid::new_v4()).await.is_none());

    let id = Uuid::new_v4();
    let (tx, _rx) = channel();
    registry.join(id, "ann", Role::Standard, tx).await;

    let removed = registry.leave(id).await.unwrap();
    assert_eq!(removed.username, "ann");
    assert!(registry.get(id).await.is_none());
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn list_active_is_most_recent_first() {
    let registry = SessionRegistry::new();
    for name in ["first", "second", "third"] {
        let (tx, _rx) = channel();
        registry.join(Uuid::new_v4(), name, Role::Standard, tx).await;
    }

    let names: Vec<String> = registry
        .list_active()
        .await
        .into_iter()
        .map(|p| p.username)
        .collect();
    assert_eq!(names, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn rejoin_after_leave_is_a_fresh_binding() {
    let registry = SessionRegistry::new();
    let old_conn = Uuid::new_v4();
    let (tx, _rx) = channel();
    registry.join(old_conn, "ann", Role::Standard, tx).await;
    registry.leave(old_conn).await;

    let new_conn = Uuid::new_v4();
    let (tx, _rx) = channel();
    let p = registry.join(new_conn, "ann", Role::Standard, tx).await;

    assert_ne!(p.connection_id, old_conn);
    assert!(registry.get(old_conn).await.is_none());
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn broadcast_excludes_one_connection() {
    let registry = SessionRegistry::new();
    let sender = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let (tx_s, mut rx_s) = channel();
    let (tx_p, mut rx_p) = channel();
    registry.join(sender, "sender", Role::Standard, tx_s).await;
    registry.join(peer, "peer", Role::Standard, tx_p).await;

    registry
        .broadcast(&ServerEvent::DeleteText { id: 9 }, Some(sender))
        .await;

    assert_eq!(rx_p.recv().await.unwrap(), ServerEvent::DeleteText { id: 9 });
    assert!(rx_s.try_recv().is_err());
}

#[tokio::test]
async fn broadcast_without_exclusion_reaches_everyone() {
    let registry = SessionRegistry::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let (tx_a, mut rx_a) = channel();
    let (tx_b, mut rx_b) = channel();
    registry.join(a, "a", Role::Standard, tx_a).await;
    registry.join(b, "b", Role::Standard, tx_b).await;

    registry.broadcast(&ServerEvent::BoardCleared, None).await;

    assert_eq!(rx_a.recv().await.unwrap(), ServerEvent::BoardCleared);
    assert_eq!(rx_b.recv().await.unwrap(), ServerEvent::BoardCleared);
}

#[tokio::test]
async fn full_channel_is_skipped_not_blocking() {
    let registry = SessionRegistry::new();
    let clogged = Uuid::new_v4();
    let (tx, _rx) = mpsc::channel(1);
    registry.join(clogged, "slow", Role::Standard, tx).await;

    // Fill the bounded channel, then broadcast twice more: must not hang.
    registry.broadcast(&ServerEvent::BoardCleared, None).await;
    registry.broadcast(&ServerEvent::BoardCleared, None).await;
    registry.broadcast(&ServerEvent::BoardCleared, None).await;
}

#[tokio::test]
async fn purge_stale_removes_only_old_bindings() {
    let registry = SessionRegistry::new();
    let (tx, _rx) = channel();
    registry.join(Uuid::new_v4(), "fresh", Role::Standard, tx).await;

    let purged = registry.purge_stale(60_000).await;
    assert!(purged.is_empty());
    assert_eq!(registry.len().await, 1);

    // A max age in the past makes every binding stale.
    let purged = registry.purge_stale(-1).await;
    assert_eq!(purged.len(), 1);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn roster_hides_connection_ids() {
    let registry = SessionRegistry::new();
    let (tx, _rx) = channel();
    registry.join(Uuid::new_v4(), "ann", Role::Administrator, tx).await;

    let roster = registry.roster().await;
    assert_eq!(roster.len(), 1);
    let json = serde_json::to_value(&roster[0]).unwrap();
    assert_eq!(json["username"], "ann");
    assert!(json.get("connection_id").is_none());
}
