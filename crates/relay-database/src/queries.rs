//! Outbox query functions.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside `AsyncDatabase::call` or against a plain connection in tests.

use crate::{DatabaseResult, NewOutboxMessage, OutboxMessage};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;

/// Append a message with the recipient's next sequence number.
///
/// The counter bump and the insert commit together.
pub fn append_message(conn: &Connection, msg: &NewOutboxMessage) -> DatabaseResult<OutboxMessage> {
    let tx = conn.unchecked_transaction()?;

    let sequence: i64 = tx.query_row(
        "INSERT INTO outbox_sequences (recipient, last_sequence) VALUES (?1, 1)
         ON CONFLICT(recipient) DO UPDATE SET last_sequence = last_sequence + 1
         RETURNING last_sequence",
        params![msg.recipient],
        |row| row.get(0),
    )?;

    tx.execute(
        "INSERT INTO outbox_messages (recipient, sequence, origin, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            msg.recipient,
            sequence,
            msg.origin,
            msg.payload,
            msg.created_at.to_rfc3339(),
        ],
    )?;

    tx.commit()?;

    debug!(recipient = %msg.recipient, sequence, "Outbox message appended");

    Ok(OutboxMessage {
        recipient: msg.recipient.clone(),
        sequence,
        origin: msg.origin.clone(),
        payload: msg.payload.clone(),
        created_at: msg.created_at,
    })
}

/// Fetch up to `limit` pending messages with a sequence greater than `after`,
/// in ascending sequence order.
pub fn fetch_pending(
    conn: &Connection,
    recipient: &str,
    after: Option<i64>,
    limit: usize,
) -> DatabaseResult<Vec<OutboxMessage>> {
    let mut stmt = conn.prepare_cached(
        "SELECT recipient, sequence, origin, payload, created_at
         FROM outbox_messages
         WHERE recipient = ?1 AND sequence > ?2
         ORDER BY sequence ASC
         LIMIT ?3",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![recipient, after.unwrap_or(0), limit], |row| {
            Ok(OutboxMessage {
                recipient: row.get(0)?,
                sequence: row.get(1)?,
                origin: row.get(2)?,
                payload: row.get(3)?,
                created_at: parse_datetime(row.get::<_, String>(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Delete one message. Returns whether a row was removed.
pub fn remove_message(conn: &Connection, recipient: &str, sequence: i64) -> DatabaseResult<bool> {
    let removed = conn.execute(
        "DELETE FROM outbox_messages WHERE recipient = ?1 AND sequence = ?2",
        params![recipient, sequence],
    )?;
    Ok(removed > 0)
}

/// Number of pending messages for a recipient.
pub fn count_pending(conn: &Connection, recipient: &str) -> DatabaseResult<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM outbox_messages WHERE recipient = ?1",
        params![recipient],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(count).unwrap_or(0))
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn new_message(recipient: &str, payload: &str) -> NewOutboxMessage {
        NewOutboxMessage {
            recipient: recipient.to_string(),
            origin: "alice".to_string(),
            payload: payload.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sequences_increase_per_recipient() {
        let conn = setup();

        let a1 = append_message(&conn, &new_message("rex", "\"a\"")).unwrap();
        let a2 = append_message(&conn, &new_message("rex", "\"b\"")).unwrap();
        let b1 = append_message(&conn, &new_message("fido", "\"c\"")).unwrap();

        assert_eq!(a1.sequence, 1);
        assert_eq!(a2.sequence, 2);
        assert_eq!(b1.sequence, 1);
    }

    #[test]
    fn test_sequence_not_reused_after_outbox_empties() {
        let conn = setup();

        let first = append_message(&conn, &new_message("rex", "1")).unwrap();
        assert!(remove_message(&conn, "rex", first.sequence).unwrap());
        assert_eq!(count_pending(&conn, "rex").unwrap(), 0);

        let second = append_message(&conn, &new_message("rex", "2")).unwrap();
        assert_eq!(second.sequence, first.sequence + 1);
    }

    #[test]
    fn test_fetch_pending_pages_in_order() {
        let conn = setup();
        for i in 0..5 {
            append_message(&conn, &new_message("rex", &i.to_string())).unwrap();
        }
        append_message(&conn, &new_message("fido", "x")).unwrap();

        let first = fetch_pending(&conn, "rex", None, 2).unwrap();
        assert_eq!(first.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![1, 2]);

        let rest = fetch_pending(&conn, "rex", Some(2), 10).unwrap();
        assert_eq!(rest.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(rest.iter().all(|m| m.recipient == "rex"));

        assert!(fetch_pending(&conn, "nobody", None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_remove_missing_message_is_false() {
        let conn = setup();
        assert!(!remove_message(&conn, "rex", 42).unwrap());
    }

    #[test]
    fn test_payload_and_origin_roundtrip() {
        let conn = setup();
        let stored = append_message(&conn, &new_message("rex", r#"{"body":"hi"}"#)).unwrap();

        let fetched = fetch_pending(&conn, "rex", None, 1).unwrap();
        assert_eq!(fetched[0].payload, r#"{"body":"hi"}"#);
        assert_eq!(fetched[0].origin, "alice");
        assert_eq!(fetched[0].created_at.timestamp(), stored.created_at.timestamp());
    }
}
