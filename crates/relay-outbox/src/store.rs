//! The storage seam behind the relay.

use crate::OutboxResult;
use async_trait::async_trait;
use relay_types::{MessageId, Origin, PendingMessage, RecipientId};
use serde_json::Value;

/// Durable mapping recipient -> ordered pending messages.
///
/// Implementations key strictly by `(recipient, sequence)`, assign sequences
/// that strictly increase per recipient and commit each write on its own.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Persist a message with the recipient's next sequence number.
    async fn append(
        &self,
        recipient: &RecipientId,
        origin: &Origin,
        payload: &Value,
    ) -> OutboxResult<PendingMessage>;

    /// Up to `limit` messages with sequence greater than `after`, ascending.
    async fn fetch_pending(
        &self,
        recipient: &RecipientId,
        after: Option<i64>,
        limit: usize,
    ) -> OutboxResult<Vec<PendingMessage>>;

    /// Delete one message. `Ok(false)` when it was already gone.
    async fn remove(&self, id: &MessageId) -> OutboxResult<bool>;

    /// Number of pending messages for a recipient.
    async fn depth(&self, recipient: &RecipientId) -> OutboxResult<u64>;

    /// Cheap reachability probe.
    async fn ping(&self) -> OutboxResult<()> {
        Ok(())
    }
}
