//! Concurrency rules.
//!
//! - A message racing an Offline -> Online transition is delivered exactly once
//! - Concurrent registrations of one identity leave exactly one mapping
//! - Different identities do not wait on each other
//! - Identity locks are released and pruned after use

use super::{from, id, Harness};
use crate::{RelaySettings, SendOutcome};
use futures::future::join_all;
use relay_types::ConnectionId;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[tokio::test]
async fn message_racing_registration_is_delivered_once() {
    let h = Harness::new().await;
    h.transport.set_delay(Some(Duration::from_millis(2)));

    for i in 0..5 {
        h.relay.send_message(&id("rex"), json!(i), from("alice")).await;
    }

    let conn = ConnectionId::new();
    let register = {
        let relay = h.relay.clone();
        tokio::spawn(async move { relay.register(id("rex"), conn).await })
    };
    let sends: Vec<_> = (5..25)
        .map(|i| {
            let relay = h.relay.clone();
            tokio::spawn(async move { relay.send_message(&id("rex"), json!(i), from("bob")).await })
        })
        .collect();

    register.await.unwrap();
    for outcome in join_all(sends).await {
        assert!(!matches!(outcome.unwrap(), SendOutcome::PersistenceFailed { .. }));
    }

    // Anything queued after the drain started would be stranded; there must be none.
    assert_eq!(h.depth("rex").await, 0);

    let mut counts: HashMap<Value, usize> = HashMap::new();
    for envelope in h.transport.messages_for(conn) {
        *counts.entry(envelope.body).or_default() += 1;
    }
    assert_eq!(counts.len(), 25);
    assert!(counts.values().all(|&n| n == 1));
}

#[tokio::test]
async fn concurrent_registrations_leave_one_mapping() {
    let h = Harness::new().await;
    for i in 0..4 {
        h.relay.send_message(&id("rex"), json!(i), from("alice")).await;
    }

    let conns: Vec<_> = (0..6).map(|_| ConnectionId::new()).collect();
    let tasks: Vec<_> = conns
        .iter()
        .map(|&conn| {
            let relay = h.relay.clone();
            tokio::spawn(async move { relay.register(id("rex"), conn).await })
        })
        .collect();
    let reports: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    let current = h.relay.lookup(&id("rex")).unwrap();
    assert!(conns.contains(&current));
    assert_eq!(h.relay.registry().online_count(), 1);

    // Exactly one registration found the backlog; the others found it empty.
    let total: usize = reports.iter().map(|r| r.delivered).sum();
    assert_eq!(total, 4);
    assert_eq!(h.depth("rex").await, 0);
}

#[tokio::test]
async fn identities_proceed_in_parallel() {
    let h = Harness::with_settings(RelaySettings {
        emit_timeout: Duration::from_secs(2),
        ..Default::default()
    })
    .await;
    h.transport.set_delay(Some(Duration::from_millis(100)));

    let started = Instant::now();
    let tasks: Vec<_> = ["rex", "fido", "spot", "max"]
        .into_iter()
        .map(|name| {
            let relay = h.relay.clone();
            tokio::spawn(async move { relay.register(id(name), ConnectionId::new()).await })
        })
        .collect();
    join_all(tasks).await;

    // Four welcomes at 100ms each; serialized would take at least 400ms.
    assert!(started.elapsed() < Duration::from_millis(350));
    assert_eq!(h.relay.registry().online_count(), 4);
}

#[tokio::test]
async fn identity_locks_are_pruned() {
    let h = Harness::new().await;
    let conn = ConnectionId::new();

    h.relay.send_message(&id("rex"), json!("hi"), from("alice")).await;
    h.relay.register(id("rex"), conn).await;
    h.relay.send_message(&id("rex"), json!("again"), from("alice")).await;
    h.relay.unregister(conn).await;

    assert_eq!(h.relay.active_identity_locks(), 0);
}
