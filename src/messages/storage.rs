use super::types::Message;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<Message>,
    /// Ids of messages that were applied tentatively and not yet confirmed
    pending: Vec<String>,
}

/// Ordered, thread-safe message list with two-phase optimistic updates
#[derive(Debug, Clone, Default)]
pub struct MessageStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MessageStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: Message) {
        self.inner.write().messages.push(message);
    }

    /// Replace the whole list, e.g. after fetching a chat's history
    pub fn replace_all(&self, messages: Vec<Message>) {
        let mut inner = self.inner.write();
        inner.messages = messages;
        inner.pending.clear();
    }

    /// Insert a message that may still be rolled back. Returns its id.
    pub fn apply_tentative(&self, message: Message) -> String {
        let id = message.id.clone();
        let mut inner = self.inner.write();
        inner.messages.push(message);
        inner.pending.push(id.clone());
        debug!("Applied tentative message {}", id);
        id
    }

    /// Make a tentative message permanent, optionally swapping in the server's copy.
    ///
    /// Returns `false` when `id` is not pending.
    pub fn confirm(&self, id: &str, server_copy: Option<Message>) -> bool {
        let mut inner = self.inner.write();
        let Some(pos) = inner.pending.iter().position(|p| p == id) else {
            return false;
        };
        inner.pending.remove(pos);

        if let Some(replacement) = server_copy {
            if let Some(slot) = inner.messages.iter_mut().find(|m| m.id == id) {
                *slot = replacement;
            }
        }
        true
    }

    /// Remove a tentative message. Returns `false` when `id` is not pending.
    pub fn rollback(&self, id: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(pos) = inner.pending.iter().position(|p| p == id) else {
            return false;
        };
        inner.pending.remove(pos);
        inner.messages.retain(|m| m.id != id);
        debug!("Rolled back tentative message {}", id);
        true
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.inner.read().pending.iter().any(|p| p == id)
    }

    pub fn get_all(&self) -> Vec<Message> {
        self.inner.read().messages.clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.inner.read().messages.last().cloned()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.messages.clear();
        inner.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;

    #[test]
    fn test_rollback_removes_only_the_tentative_message() {
        let storage = MessageStorage::new();
        storage.add(Message::user("first"));
        let id = storage.apply_tentative(Message::tentative(Role::User, "second"));
        assert_eq!(storage.len(), 2);
        assert!(storage.is_pending(&id));

        assert!(storage.rollback(&id));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get_all()[0].content, "first");

        // A second rollback is a no-op
        assert!(!storage.rollback(&id));
    }

    #[test]
    fn test_confirm_swaps_server_copy() {
        let storage = MessageStorage::new();
        let id = storage.apply_tentative(Message::tentative(Role::User, "hello"));

        let server = Message::user("hello").with_id("64f0c0ffee");
        assert!(storage.confirm(&id, Some(server)));
        assert!(!storage.is_pending(&id));

        let all = storage.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "64f0c0ffee");

        // Confirmed messages can no longer be rolled back
        assert!(!storage.rollback("64f0c0ffee"));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_confirm_keeps_local_copy() {
        let storage = MessageStorage::new();
        let id = storage.apply_tentative(Message::tentative(Role::User, "hello"));
        assert!(storage.confirm(&id, None));
        assert_eq!(storage.get_all()[0].id, id);
    }

    #[test]
    fn test_replace_all_drops_pending() {
        let storage = MessageStorage::new();
        let id = storage.apply_tentative(Message::tentative(Role::User, "x"));
        storage.replace_all(vec![Message::assistant("a"), Message::user("b")]);
        assert!(!storage.is_pending(&id));
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.last().map(|m| m.content), Some("b".to_string()));
    }
}
