//! Short-term conversation memory for an agent instance.
//!
//! [`MemoryStore`] is the seam: this crate ships only [`InMemoryStore`].
//! A durable long-term backend (named by `AgentDefinition::memory_long_term_backend`)
//! is out of scope here.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::llm::Message;

/// Conversation memory keyed by agent instance.
///
/// Object-safe: stored as `Arc<dyn MemoryStore>`.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, instance_id: Uuid, message: Message);

    /// The most recent `max_messages` messages for this instance, oldest
    /// first.
    async fn window(&self, instance_id: Uuid, max_messages: usize) -> Vec<Message>;

    async fn clear(&self, instance_id: Uuid);
}

const _: () = {
    fn _assert_object_safe(_: &dyn MemoryStore) {}
};

/// A process-local, non-persistent [`MemoryStore`].
#[derive(Default)]
pub struct InMemoryStore {
    conversations: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, instance_id: Uuid, message: Message) {
        self.conversations
            .lock()
            .expect("memory store mutex poisoned")
            .entry(instance_id)
            .or_default()
            .push(message);
    }

    async fn window(&self, instance_id: Uuid, max_messages: usize) -> Vec<Message> {
        let conversations = self.conversations.lock().expect("memory store mutex poisoned");
        match conversations.get(&instance_id) {
            Some(messages) => {
                let start = messages.len().saturating_sub(max_messages);
                messages[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    async fn clear(&self, instance_id: Uuid) {
        self.conversations.lock().expect("memory store mutex poisoned").remove(&instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn window_truncates_to_most_recent() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        for i in 0..5 {
            store.append(id, Message::user(format!("msg {i}"))).await;
        }

        let window = store.window(id, 2).await;
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "msg 3");
        assert_eq!(window[1].content, "msg 4");
    }

    #[tokio::test]
    async fn unknown_instance_returns_empty_window() {
        let store = InMemoryStore::new();
        assert!(store.window(Uuid::new_v4(), 10).await.is_empty());
    }

    #[tokio::test]
    async fn clear_removes_conversation() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        store.append(id, Message::user("hi")).await;
        store.clear(id).await;
        assert!(store.window(id, 10).await.is_empty());
    }
}
