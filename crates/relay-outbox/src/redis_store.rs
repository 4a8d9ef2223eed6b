//! Outbox on Redis sorted sets.
//!
//! Layout per recipient:
//! - `relay:seq:{recipient}`: counter bumped with `INCR`
//! - `relay:msgs:{recipient}`: sorted set, score = sequence, member = JSON entry
//!
//! The two prefixes differ before the recipient starts, so no recipient
//! name (colons included) can reach another recipient's keys.

use crate::{OutboxError, OutboxResult, OutboxStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use relay_types::{MessageId, Origin, PendingMessage, RecipientId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

const MESSAGES_PREFIX: &str = "relay:msgs:";
const SEQUENCE_PREFIX: &str = "relay:seq:";

/// Sorted-set member. Carries the sequence so members never collide.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    sequence: i64,
    origin: String,
    payload: Value,
    created_at: DateTime<Utc>,
}

fn messages_key(recipient: &RecipientId) -> String {
    format!("{}{}", MESSAGES_PREFIX, recipient)
}

fn sequence_key(recipient: &RecipientId) -> String {
    format!("{}{}", SEQUENCE_PREFIX, recipient)
}

fn decode(recipient: &RecipientId, member: &str) -> OutboxResult<PendingMessage> {
    let entry: StoredEntry = serde_json::from_str(member)
        .map_err(|e| OutboxError::InvalidData(format!("{} member: {}", messages_key(recipient), e)))?;

    Ok(PendingMessage {
        recipient: recipient.clone(),
        sequence: entry.sequence,
        origin: Origin::new(entry.origin),
        payload: entry.payload,
        created_at: entry.created_at,
    })
}

/// Redis-backed outbox.
///
/// A failed `ZADD` after a successful `INCR` leaves a gap in the sequence;
/// ordering is unaffected.
#[derive(Clone)]
pub struct RedisOutbox {
    conn: MultiplexedConnection,
}

impl RedisOutbox {
    pub async fn connect(redis_url: &str) -> OutboxResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Connected to Redis outbox");
        Ok(Self { conn })
    }
}

#[async_trait]
impl OutboxStore for RedisOutbox {
    async fn append(
        &self,
        recipient: &RecipientId,
        origin: &Origin,
        payload: &Value,
    ) -> OutboxResult<PendingMessage> {
        let mut conn = self.conn.clone();

        let sequence: i64 = conn.incr(sequence_key(recipient), 1).await?;
        let entry = StoredEntry {
            sequence,
            origin: origin.as_str().to_string(),
            payload: payload.clone(),
            created_at: Utc::now(),
        };
        let member = serde_json::to_string(&entry)?;

        let _: i64 = conn.zadd(messages_key(recipient), member, sequence).await?;

        debug!(recipient = %recipient, sequence, "Outbox message appended");

        Ok(PendingMessage {
            recipient: recipient.clone(),
            sequence,
            origin: origin.clone(),
            payload: entry.payload,
            created_at: entry.created_at,
        })
    }

    async fn fetch_pending(
        &self,
        recipient: &RecipientId,
        after: Option<i64>,
        limit: usize,
    ) -> OutboxResult<Vec<PendingMessage>> {
        let mut conn = self.conn.clone();

        let min = match after {
            Some(sequence) => format!("({}", sequence),
            None => "-inf".to_string(),
        };
        let count = isize::try_from(limit).unwrap_or(isize::MAX);

        let members: Vec<String> = conn
            .zrangebyscore_limit(messages_key(recipient), min, "+inf", 0, count)
            .await?;

        members.iter().map(|m| decode(recipient, m)).collect()
    }

    async fn remove(&self, id: &MessageId) -> OutboxResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .zrembyscore(messages_key(&id.recipient), id.sequence, id.sequence)
            .await?;

        debug!(recipient = %id.recipient, sequence = id.sequence, removed, "Outbox remove");
        Ok(removed > 0)
    }

    async fn depth(&self, recipient: &RecipientId) -> OutboxResult<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.zcard(messages_key(recipient)).await?;
        Ok(count)
    }

    async fn ping(&self) -> OutboxResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
