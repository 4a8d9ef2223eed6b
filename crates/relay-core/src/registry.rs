//! Connection registry: who is online, and on which connection.

use parking_lot::RwLock;
use relay_types::{ConnectionId, RecipientId};
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
struct RegistryInner {
    by_recipient: HashMap<RecipientId, ConnectionId>,
    by_connection: HashMap<ConnectionId, RecipientId>,
}

impl RegistryInner {
    fn unlink_connection(&mut self, connection: ConnectionId) -> Option<RecipientId> {
        let recipient = self.by_connection.remove(&connection)?;
        if self.by_recipient.get(&recipient) == Some(&connection) {
            self.by_recipient.remove(&recipient);
        }
        Some(recipient)
    }
}

/// In-memory map recipient -> live connection, with a reverse index
/// connection -> recipient.
///
/// Both maps are always one-to-one. The registry only stores handles; the
/// transport owns the connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `recipient` to `connection`, replacing any previous mapping.
    ///
    /// Returns the connection that was replaced, if any. A connection that
    /// was registered under another identity loses that identity.
    pub fn insert(&self, recipient: RecipientId, connection: ConnectionId) -> Option<ConnectionId> {
        let mut inner = self.inner.write();

        if let Some(previous) = inner.by_connection.get(&connection) {
            if previous != &recipient {
                debug!(connection = %connection, previous = %previous, recipient = %recipient, "Connection re-identified");
                inner.unlink_connection(connection);
            }
        }

        let replaced = inner.by_recipient.insert(recipient.clone(), connection);
        if let Some(old) = replaced.filter(|old| *old != connection) {
            inner.by_connection.remove(&old);
        }
        inner.by_connection.insert(connection, recipient);

        replaced.filter(|old| *old != connection)
    }

    /// Remove the mapping held by `connection`, if any.
    pub fn remove_connection(&self, connection: ConnectionId) -> Option<RecipientId> {
        self.inner.write().unlink_connection(connection)
    }

    /// Remove `recipient` only while it is still mapped to `connection`.
    pub fn remove_if_current(&self, recipient: &RecipientId, connection: ConnectionId) -> bool {
        let mut inner = self.inner.write();
        if inner.by_recipient.get(recipient) == Some(&connection) {
            inner.unlink_connection(connection);
            true
        } else {
            false
        }
    }

    pub fn lookup(&self, recipient: &RecipientId) -> Option<ConnectionId> {
        self.inner.read().by_recipient.get(recipient).copied()
    }

    pub fn recipient_of(&self, connection: ConnectionId) -> Option<RecipientId> {
        self.inner.read().by_connection.get(&connection).cloned()
    }

    pub fn is_online(&self, recipient: &RecipientId) -> bool {
        self.inner.read().by_recipient.contains_key(recipient)
    }

    pub fn online_count(&self) -> usize {
        self.inner.read().by_recipient.len()
    }

    /// Online recipients, sorted by name.
    pub fn online_recipients(&self) -> Vec<RecipientId> {
        let mut recipients: Vec<_> = self.inner.read().by_recipient.keys().cloned().collect();
        recipients.sort();
        recipients
    }
}
