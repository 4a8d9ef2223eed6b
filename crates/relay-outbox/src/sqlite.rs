//! Outbox on the relay's SQLite database.

use crate::{OutboxError, OutboxResult, OutboxStore};
use async_trait::async_trait;
use chrono::Utc;
use relay_database::{queries, AsyncDatabase, NewOutboxMessage, OutboxMessage};
use relay_types::{MessageId, Origin, PendingMessage, RecipientId};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// SQLite-backed outbox. Survives restarts when opened on a file.
#[derive(Clone)]
pub struct SqliteOutbox {
    db: AsyncDatabase,
}

impl SqliteOutbox {
    pub async fn open(path: &Path) -> OutboxResult<Self> {
        Ok(Self::from_database(AsyncDatabase::open(path).await?))
    }

    pub async fn open_in_memory() -> OutboxResult<Self> {
        Ok(Self::from_database(AsyncDatabase::open_in_memory().await?))
    }

    pub fn from_database(db: AsyncDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &AsyncDatabase {
        &self.db
    }
}

fn into_pending(row: OutboxMessage) -> OutboxResult<PendingMessage> {
    let recipient = RecipientId::parse(&row.recipient)
        .map_err(|e| OutboxError::InvalidData(format!("recipient {:?}: {}", row.recipient, e)))?;
    let payload = serde_json::from_str(&row.payload)?;

    Ok(PendingMessage {
        recipient,
        sequence: row.sequence,
        origin: Origin::new(row.origin),
        payload,
        created_at: row.created_at,
    })
}

#[async_trait]
impl OutboxStore for SqliteOutbox {
    async fn append(
        &self,
        recipient: &RecipientId,
        origin: &Origin,
        payload: &Value,
    ) -> OutboxResult<PendingMessage> {
        // Encode outside the executor thread.
        let new_message = NewOutboxMessage {
            recipient: recipient.as_str().to_string(),
            origin: origin.as_str().to_string(),
            payload: serde_json::to_string(payload)?,
            created_at: Utc::now(),
        };

        let row = self
            .db
            .call(move |conn| queries::append_message(conn, &new_message))
            .await?;

        into_pending(row)
    }

    async fn fetch_pending(
        &self,
        recipient: &RecipientId,
        after: Option<i64>,
        limit: usize,
    ) -> OutboxResult<Vec<PendingMessage>> {
        let key = recipient.as_str().to_string();
        let rows = self
            .db
            .call(move |conn| queries::fetch_pending(conn, &key, after, limit))
            .await?;

        rows.into_iter().map(into_pending).collect()
    }

    async fn remove(&self, id: &MessageId) -> OutboxResult<bool> {
        let key = id.recipient.as_str().to_string();
        let sequence = id.sequence;
        let removed = self
            .db
            .call(move |conn| queries::remove_message(conn, &key, sequence))
            .await?;

        debug!(recipient = %id.recipient, sequence, removed, "Outbox remove");
        Ok(removed)
    }

    async fn depth(&self, recipient: &RecipientId) -> OutboxResult<u64> {
        let key = recipient.as_str().to_string();
        Ok(self
            .db
            .call(move |conn| queries::count_pending(conn, &key))
            .await?)
    }

    async fn ping(&self) -> OutboxResult<()> {
        Ok(self.db.health_check().await?)
    }
}
