//! Per-identity async serialization.

use parking_lot::Mutex;
use relay_types::RecipientId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per recipient, created on demand and pruned when no
/// task holds or awaits it. The map lock is never held across an await.
#[derive(Default)]
pub struct IdentityLocks {
    locks: Mutex<HashMap<RecipientId, Arc<AsyncMutex<()>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `recipient`.
    pub async fn lock(&self, recipient: &RecipientId) -> IdentityGuard<'_> {
        let entry = {
            let mut locks = self.locks.lock();
            locks
                .entry(recipient.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = entry.lock_owned().await;

        IdentityGuard {
            locks: self,
            recipient: recipient.clone(),
            guard: Some(guard),
        }
    }

    /// Number of identities with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, recipient: &RecipientId) {
        let mut locks = self.locks.lock();
        // Only the map's own reference left: no holder, no waiter.
        if locks
            .get(recipient)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(recipient);
        }
    }
}

/// Exclusive access to one identity; released on drop.
pub struct IdentityGuard<'a> {
    locks: &'a IdentityLocks,
    recipient: RecipientId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdentityGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.recipient);
    }
}
