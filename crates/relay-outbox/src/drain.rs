//! Lazy cursor over one recipient's backlog.

use crate::{OutboxResult, OutboxStore};
use relay_types::{PendingMessage, RecipientId};
use std::collections::VecDeque;

/// Messages fetched per page.
pub const DRAIN_PAGE_SIZE: usize = 50;

/// Pages through pending messages in ascending sequence order.
///
/// The cursor advances by sequence, so removing already-yielded messages
/// while draining is safe. A fresh drain always starts from the oldest
/// pending message.
pub struct OutboxDrain<'a> {
    store: &'a dyn OutboxStore,
    recipient: RecipientId,
    page_size: usize,
    after: Option<i64>,
    buffer: VecDeque<PendingMessage>,
    exhausted: bool,
}

impl<'a> OutboxDrain<'a> {
    pub fn new(store: &'a dyn OutboxStore, recipient: RecipientId) -> Self {
        Self::with_page_size(store, recipient, DRAIN_PAGE_SIZE)
    }

    pub fn with_page_size(store: &'a dyn OutboxStore, recipient: RecipientId, page_size: usize) -> Self {
        Self {
            store,
            recipient,
            page_size: page_size.max(1),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Next pending message, or `None` once the backlog is exhausted.
    pub async fn next(&mut self) -> OutboxResult<Option<PendingMessage>> {
        if self.buffer.is_empty() && !self.exhausted {
            let page = self
                .store
                .fetch_pending(&self.recipient, self.after, self.page_size)
                .await?;

            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.after = Some(last.sequence);
            }
            self.buffer.extend(page);
        }

        Ok(self.buffer.pop_front())
    }

    /// Collect everything that remains.
    pub async fn collect_all(mut self) -> OutboxResult<Vec<PendingMessage>> {
        let mut all = Vec::new();
        while let Some(message) = self.next().await? {
            all.push(message);
        }
        Ok(all)
    }
}
