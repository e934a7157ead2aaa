//! In-memory Store
//!
//! All tables live behind one `tokio::sync::RwLock`; every trait method
//! takes the guard once, so each operation is atomic with respect to the
//! others. Used by tests and by the server when `DATABASE_URL` is unset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{group_delivered, DeliveredBatch, PresenceBinding, Store, StoreError, StoreResult};
use crate::shared::conversation::{Conversation, LastMessage};
use crate::shared::message::{Message, MessageStatus, NewMessage};
use crate::shared::user::User;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    conversations: HashMap<Uuid, Conversation>,
    /// Insertion order, which is also creation order
    messages: Vec<Message>,
    message_index: HashMap<Uuid, usize>,
}

impl Tables {
    fn conversation_mut(&mut self, chat_id: Uuid) -> StoreResult<&mut Conversation> {
        self.conversations
            .get_mut(&chat_id)
            .ok_or_else(|| StoreError::not_found("conversation", chat_id))
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn bind_presence(
        &self,
        user_id: Uuid,
        connection: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PresenceBinding>> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Ok(None);
        }

        let mut displaced = Vec::new();
        for other in tables
            .users
            .values_mut()
            .filter(|u| u.id != user_id && u.socket_id == Some(connection))
        {
            other.is_online = false;
            other.last_seen = at;
            other.socket_id = None;
            displaced.push(other.clone());
        }

        Ok(tables.users.get_mut(&user_id).map(|user| {
            user.is_online = true;
            user.last_seen = at;
            user.socket_id = Some(connection);
            PresenceBinding {
                user: user.clone(),
                displaced,
            }
        }))
    }

    async fn release_presence(&self, connection: Uuid, at: DateTime<Utc>) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        let mut released = None;
        for user in tables.users.values_mut().filter(|u| u.socket_id == Some(connection)) {
            user.is_online = false;
            user.last_seen = at;
            user.socket_id = None;
            released.get_or_insert_with(|| user.clone());
        }
        Ok(released)
    }

    async fn any_online(&self, user_ids: &[Uuid]) -> StoreResult<bool> {
        let tables = self.tables.read().await;
        Ok(user_ids
            .iter()
            .any(|id| tables.users.get(id).is_some_and(|user| user.is_online)))
    }

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        let mut tables = self.tables.write().await;
        tables.conversations.insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, chat_id: Uuid) -> StoreResult<Option<Conversation>> {
        Ok(self.tables.read().await.conversations.get(&chat_id).cloned())
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect())
    }

    async fn add_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let conversation = tables.conversation_mut(chat_id)?;
        let added = conversation.add_participant(user_id);
        if added {
            conversation.updated_at = Utc::now();
        }
        Ok(added)
    }

    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let conversation = tables.conversation_mut(chat_id)?;
        let removed = conversation.remove_participant(user_id);
        if removed {
            conversation.updated_at = Utc::now();
        }
        Ok(removed)
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(&message.chat_id) {
            return Err(StoreError::not_found("conversation", message.chat_id));
        }
        let message = Message::from_new(message, Uuid::new_v4(), Utc::now());
        let index = tables.messages.len();
        tables.message_index.insert(message.id, index);
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .message_index
            .get(&message_id)
            .and_then(|&index| tables.messages.get(index))
            .cloned())
    }

    async fn messages_for_conversation(&self, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn increment_unread(&self, chat_id: Uuid, recipients: &[Uuid]) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.conversation_mut(chat_id)?.increment_unread(recipients);
        Ok(())
    }

    async fn reset_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.conversation_mut(chat_id)?.reset_unread(user_id);
        Ok(())
    }

    async fn set_last_message_if_newer(&self, chat_id: Uuid, snapshot: &LastMessage) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables.conversation_mut(chat_id)?.apply_last_message(snapshot.clone()))
    }

    async fn deliver_pending(&self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<DeliveredBatch>> {
        let mut tables = self.tables.write().await;
        let Tables {
            conversations,
            messages,
            ..
        } = &mut *tables;

        let mut rows = Vec::new();
        for message in messages.iter_mut() {
            let addressed = message.sender_id != recipient
                && message.status == MessageStatus::Sent
                && conversations
                    .get(&message.chat_id)
                    .is_some_and(|c| c.has_participant(recipient));
            if addressed && message.mark_delivered(at) {
                rows.push((message.chat_id, message.sender_id));
            }
        }
        Ok(group_delivered(rows))
    }

    async fn mark_read(&self, chat_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for message in tables
            .messages
            .iter_mut()
            .filter(|m| m.chat_id == chat_id && m.sender_id != reader)
        {
            if message.mark_read_by(reader, at) {
                changed += 1;
            }
        }
        Ok(changed)
    }
}
