//! Store wrapper with injectable latency and failures

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use peerchat::backend::store::{DeliveredBatch, MemoryStore, PresenceBinding, Store, StoreError, StoreResult};
use peerchat::shared::conversation::{Conversation, LastMessage};
use peerchat::shared::message::{Message, NewMessage};
use peerchat::shared::user::User;

/// Delegates to a `MemoryStore`, except where told otherwise
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    insert_delay_ms: AtomicU64,
    fail_inserts: AtomicBool,
    fail_presence: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold every `insert_message` for `delay` before it reaches the store
    pub fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_presence(&self, fail: bool) {
        self.fail_presence.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_user(&self, user: User) -> StoreResult<User> {
        self.inner.insert_user(user).await
    }

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn bind_presence(
        &self,
        user_id: Uuid,
        connection: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PresenceBinding>> {
        self.inner.bind_presence(user_id, connection, at).await
    }

    async fn release_presence(&self, connection: Uuid, at: DateTime<Utc>) -> StoreResult<Option<User>> {
        self.inner.release_presence(connection, at).await
    }

    async fn any_online(&self, user_ids: &[Uuid]) -> StoreResult<bool> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("presence table offline".to_string()));
        }
        self.inner.any_online(user_ids).await
    }

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation> {
        self.inner.insert_conversation(conversation).await
    }

    async fn get_conversation(&self, chat_id: Uuid) -> StoreResult<Option<Conversation>> {
        self.inner.get_conversation(chat_id).await
    }

    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>> {
        self.inner.conversations_for_user(user_id).await
    }

    async fn add_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.inner.add_participant(chat_id, user_id).await
    }

    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool> {
        self.inner.remove_participant(chat_id, user_id).await
    }

    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("messages table offline".to_string()));
        }
        self.inner.insert_message(message).await
    }

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>> {
        self.inner.get_message(message_id).await
    }

    async fn messages_for_conversation(&self, chat_id: Uuid) -> StoreResult<Vec<Message>> {
        self.inner.messages_for_conversation(chat_id).await
    }

    async fn increment_unread(&self, chat_id: Uuid, recipients: &[Uuid]) -> StoreResult<()> {
        self.inner.increment_unread(chat_id, recipients).await
    }

    async fn reset_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.inner.reset_unread(chat_id, user_id).await
    }

    async fn set_last_message_if_newer(&self, chat_id: Uuid, snapshot: &LastMessage) -> StoreResult<bool> {
        self.inner.set_last_message_if_newer(chat_id, snapshot).await
    }

    async fn deliver_pending(&self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<DeliveredBatch>> {
        self.inner.deliver_pending(recipient, at).await
    }

    async fn mark_read(&self, chat_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.mark_read(chat_id, reader, at).await
    }
}
