//! Drain rules.
//!
//! - Registration drains the backlog in FIFO order as `oldMessage` events
//! - A welcome event precedes the backlog and its failure does not block it
//! - An emission failure stops the drain; the rest stays queued
//! - A remove failure after emission stops the drain and the message is
//!   delivered again on the next registration (the duplication window)
//! - Nothing is lost across repeated interrupted reconnections
//! - New messages never overtake a backlog an interrupted drain left behind

use super::{bodies, from, id, Harness};
use crate::{DrainOutcome, InterruptReason, SendOutcome};
use relay_types::{ConnectionId, EventName};
use serde_json::json;
use std::time::Duration;

async fn queue(h: &Harness, count: usize) {
    for i in 0..count {
        h.relay.send_message(&id("rex"), json!(i), from("alice")).await;
    }
}

fn expected(range: std::ops::Range<usize>) -> Vec<serde_json::Value> {
    range.map(|i| json!(i)).collect()
}

#[tokio::test]
async fn registration_drains_backlog_in_order() {
    let h = Harness::new().await;
    queue(&h, 7).await;

    let conn = ConnectionId::new();
    let report = h.relay.register(id("rex"), conn).await;

    assert_eq!(report.delivered, 7);
    assert_eq!(report.outcome, DrainOutcome::Complete);
    assert_eq!(bodies(&h.transport, conn), expected(0..7));
    assert_eq!(h.depth("rex").await, 0);

    let events = h.transport.events_for(conn);
    assert_eq!(events[0].event, EventName::Welcome);
    assert!(events[1..].iter().all(|e| e.event == EventName::OldMessage));

    let sequences: Vec<_> = h
        .transport
        .messages_for(conn)
        .iter()
        .map(|m| m.sequence.unwrap())
        .collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn empty_backlog_is_complete() {
    let h = Harness::new().await;
    let report = h.relay.register(id("rex"), ConnectionId::new()).await;
    assert_eq!(report.delivered, 0);
    assert!(report.is_complete());
}

#[tokio::test]
async fn welcome_failure_does_not_block_drain() {
    let h = Harness::new().await;
    queue(&h, 2).await;
    h.transport.fail_event(EventName::Welcome);

    let conn = ConnectionId::new();
    let report = h.relay.register(id("rex"), conn).await;

    assert!(report.is_complete());
    assert_eq!(bodies(&h.transport, conn), expected(0..2));
}

#[tokio::test]
async fn emit_failure_stops_drain_and_keeps_rest() {
    let h = Harness::new().await;
    queue(&h, 5).await;
    // welcome + two messages
    h.transport.fail_after(3);

    let conn = ConnectionId::new();
    let report = h.relay.register(id("rex"), conn).await;

    assert_eq!(report.delivered, 2);
    assert!(matches!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::EmitFailed(_))
    ));
    assert_eq!(h.depth("rex").await, 3);
    assert!(h.relay.is_online(&id("rex")), "a failed drain does not unregister");
}

#[tokio::test]
async fn emit_timeout_stops_drain() {
    let h = Harness::new().await;
    queue(&h, 2).await;
    h.transport.set_delay(Some(Duration::from_millis(500)));

    let report = h.relay.register(id("rex"), ConnectionId::new()).await;

    assert_eq!(report.delivered, 0);
    assert_eq!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::EmitTimedOut)
    );
    assert_eq!(h.depth("rex").await, 2);
}

#[tokio::test]
async fn remove_failure_redelivers_on_next_registration() {
    let h = Harness::new().await;
    queue(&h, 3).await;
    h.outbox.set_fail_remove(true);

    let first = ConnectionId::new();
    let report = h.relay.register(id("rex"), first).await;

    assert_eq!(report.delivered, 1);
    assert!(matches!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::RemoveFailed { sequence: 1, .. })
    ));
    assert_eq!(bodies(&h.transport, first), expected(0..1));
    assert_eq!(h.depth("rex").await, 3);

    h.outbox.set_fail_remove(false);
    h.relay.unregister(first).await;

    let second = ConnectionId::new();
    let report = h.relay.register(id("rex"), second).await;

    assert!(report.is_complete());
    // Message 0 arrives a second time: emitted before, never removed.
    assert_eq!(bodies(&h.transport, second), expected(0..3));
    assert_eq!(h.depth("rex").await, 0);
}

#[tokio::test]
async fn store_read_failure_interrupts_drain() {
    let h = Harness::new().await;
    queue(&h, 2).await;
    h.outbox.set_fail_fetch(true);

    let report = h.relay.register(id("rex"), ConnectionId::new()).await;

    assert!(matches!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::StoreUnavailable(_))
    ));
    h.outbox.set_fail_fetch(false);
    assert_eq!(h.depth("rex").await, 2);
}

#[tokio::test]
async fn interrupted_reconnections_lose_nothing() {
    let h = Harness::new().await;
    queue(&h, 10).await;

    let mut received = Vec::new();
    for _ in 0..10 {
        let conn = ConnectionId::new();
        // welcome + one message per connection
        h.transport.fail_after(2);
        h.relay.register(id("rex"), conn).await;
        received.extend(bodies(&h.transport, conn));
        h.relay.on_connection_closed(conn).await;
        if h.depth("rex").await == 0 {
            break;
        }
    }

    assert_eq!(received, expected(0..10));
    assert_eq!(h.outbox.removes(), 10);
}

#[tokio::test]
async fn drain_of_other_recipient_is_untouched() {
    let h = Harness::new().await;
    h.relay.send_message(&id("fido"), json!("bone"), from("alice")).await;
    queue(&h, 1).await;

    h.relay.register(id("rex"), ConnectionId::new()).await;

    assert_eq!(h.depth("rex").await, 0);
    assert_eq!(h.depth("fido").await, 1);
}

#[tokio::test]
async fn interrupted_backlog_is_not_overtaken_by_live_sends() {
    let h = Harness::new().await;
    queue(&h, 3).await;
    // welcome + message 0
    h.transport.fail_after(2);

    let first = ConnectionId::new();
    let report = h.relay.register(id("rex"), first).await;
    assert!(matches!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::EmitFailed(_))
    ));
    assert!(h.relay.is_behind(&id("rex")));

    h.transport.heal();
    let outcome = h.relay.send_message(&id("rex"), json!(3), from("alice")).await;

    assert!(matches!(outcome, SendOutcome::Queued { .. }));
    assert_eq!(bodies(&h.transport, first), expected(0..1));
    assert_eq!(h.depth("rex").await, 3);

    h.relay.on_connection_closed(first).await;
    let second = ConnectionId::new();
    assert!(h.relay.register(id("rex"), second).await.is_complete());

    assert_eq!(bodies(&h.transport, second), expected(1..4));
    assert!(!h.relay.is_behind(&id("rex")));
    let live = h.relay.send_message(&id("rex"), json!(4), from("alice")).await;
    assert_eq!(live, SendOutcome::DeliveredLive);
}

#[tokio::test]
async fn remove_failure_also_holds_back_live_sends() {
    let h = Harness::new().await;
    queue(&h, 2).await;
    h.outbox.set_fail_remove(true);

    let conn = ConnectionId::new();
    h.relay.register(id("rex"), conn).await;
    h.outbox.set_fail_remove(false);

    let outcome = h.relay.send_message(&id("rex"), json!(2), from("alice")).await;

    assert!(matches!(outcome, SendOutcome::Queued { .. }));
    assert_eq!(bodies(&h.transport, conn), expected(0..1));
    assert_eq!(h.depth("rex").await, 3);
}

#[tokio::test]
async fn drain_timeout_disconnects_the_robot() {
    let h = Harness::new().await;
    queue(&h, 1).await;

    let conn = ConnectionId::new();
    h.transport.set_delay(Some(Duration::from_millis(500)));
    let report = h.relay.register(id("rex"), conn).await;

    assert_eq!(
        report.outcome,
        DrainOutcome::Interrupted(InterruptReason::EmitTimedOut)
    );
    assert!(h.transport.disconnected().contains(&conn));
    assert_eq!(h.depth("rex").await, 1);
}

