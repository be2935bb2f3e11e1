//! Durable-storage seam.
//!
//! The relay holds no message history itself; it appends relayed chat
//! messages through this contract and leaves persistence, paging, and read
//! state to whatever backs it. `InMemoryMessageStore` is the development
//! stand-in.

use async_trait::async_trait;
use dashmap::DashMap;

use vimbalambi_proto::{MessageData, Result};

/// One message as retained by a store implementation.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub conversation_id: i64,
    pub sender_id: String,
    pub content: Option<String>,
    pub media_url: Option<String>,
    pub timestamp: i64,
    pub is_read: bool,
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: &MessageData, timestamp: i64) -> Result<()>;

    /// Most recent `limit` messages of a conversation, oldest first.
    async fn history(&self, conversation_id: i64, limit: usize) -> Result<Vec<StoredMessage>>;

    /// Mark everything in the conversation not sent by `user_id` as read.
    async fn mark_read(&self, conversation_id: i64, user_id: &str) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    conversations: DashMap<i64, Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, message: &MessageData, timestamp: i64) -> Result<()> {
        self.conversations
            .entry(message.conversation_id)
            .or_default()
            .push(StoredMessage {
                conversation_id: message.conversation_id,
                sender_id: message.sender_id.clone(),
                content: message.content.clone(),
                media_url: message.media_url.clone(),
                timestamp,
                is_read: false,
            });
        Ok(())
    }

    async fn history(&self, conversation_id: i64, limit: usize) -> Result<Vec<StoredMessage>> {
        let messages = match self.conversations.get(&conversation_id) {
            Some(list) => {
                let skip = list.len().saturating_sub(limit);
                list.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        };
        Ok(messages)
    }

    async fn mark_read(&self, conversation_id: i64, user_id: &str) -> Result<()> {
        if let Some(mut list) = self.conversations.get_mut(&conversation_id) {
            for message in list.iter_mut() {
                if message.sender_id != user_id {
                    message.is_read = true;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(conversation_id: i64, sender: &str, text: &str) -> MessageData {
        MessageData {
            conversation_id,
            content: Some(text.into()),
            media_url: None,
            sender_id: sender.into(),
        }
    }

    #[tokio::test]
    async fn history_is_capped_and_oldest_first() {
        let store = InMemoryMessageStore::new();
        for i in 0..5 {
            store
                .append(&message(1, "alice", &format!("m{i}")), i)
                .await
                .unwrap();
        }

        let recent = store.history(1, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content.as_deref(), Some("m2"));
        assert_eq!(recent[2].content.as_deref(), Some("m4"));

        assert!(store.history(99, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_skips_own_messages() {
        let store = InMemoryMessageStore::new();
        store.append(&message(1, "alice", "hi"), 1).await.unwrap();
        store.append(&message(1, "bob", "hey"), 2).await.unwrap();

        store.mark_read(1, "bob").await.unwrap();

        let all = store.history(1, 10).await.unwrap();
        assert!(all.iter().find(|m| m.sender_id == "alice").unwrap().is_read);
        assert!(!all.iter().find(|m| m.sender_id == "bob").unwrap().is_read);
    }
}
