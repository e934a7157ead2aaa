//! Persistence Gateway
//!
//! Durable storage for users, conversations and messages behind a single
//! [`Store`] trait, so the realtime core can run against Postgres in
//! production and against [`MemoryStore`] in tests or when no database is
//! configured.
//!
//! # Atomicity
//!
//! Every method is one atomic operation against the backing store. Shared
//! fields that concurrent sends race on (unread counters, the last-message
//! snapshot, message status) are only ever changed through the conditional
//! operations below, never by reading a value and writing it back.
//!
//! # Module Structure
//!
//! ```text
//! store/
//! ├── mod.rs       - Store trait and StoreError
//! ├── memory.rs    - In-process implementation
//! └── postgres.rs  - sqlx/Postgres implementation
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::shared::conversation::{Conversation, LastMessage};
use crate::shared::message::{Message, NewMessage};
use crate::shared::user::User;

/// In-process store
pub mod memory;

/// Postgres store
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors returned by a [`Store`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store cannot serve requests right now
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of binding a user to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceBinding {
    pub user: User,
    /// Users the connection was bound to before, now offline
    pub displaced: Vec<User>,
}

/// Messages moved from `sent` to `delivered` in one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredBatch {
    pub chat_id: Uuid,
    /// Distinct authors of the transitioned messages
    pub sender_ids: Vec<Uuid>,
    pub count: u64,
}

/// Group backfill rows by conversation, keeping first-seen order.
pub(crate) fn group_delivered(rows: impl IntoIterator<Item = (Uuid, Uuid)>) -> Vec<DeliveredBatch> {
    let mut batches: Vec<DeliveredBatch> = Vec::new();
    for (chat_id, sender_id) in rows {
        let index = match batches.iter().position(|b| b.chat_id == chat_id) {
            Some(index) => index,
            None => {
                batches.push(DeliveredBatch {
                    chat_id,
                    sender_ids: Vec::new(),
                    count: 0,
                });
                batches.len() - 1
            }
        };
        let batch = &mut batches[index];
        batch.count += 1;
        if !batch.sender_ids.contains(&sender_id) {
            batch.sender_ids.push(sender_id);
        }
    }
    batches
}

/// Persistence gateway consumed by the realtime core
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: User) -> StoreResult<User>;

    async fn get_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Mark `user_id` online and bind it to `connection`, replacing any previous binding.
    ///
    /// Any other user bound to the same connection loses the binding and goes
    /// offline in the same operation. Returns `None` when the user does not exist.
    async fn bind_presence(
        &self,
        user_id: Uuid,
        connection: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PresenceBinding>>;

    /// Mark offline the user currently bound to `connection`, if any.
    ///
    /// Returns `None` when no user holds that binding, i.e. the handle is stale.
    async fn release_presence(&self, connection: Uuid, at: DateTime<Utc>) -> StoreResult<Option<User>>;

    /// Whether any of `user_ids` is currently online
    async fn any_online(&self, user_ids: &[Uuid]) -> StoreResult<bool>;

    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<Conversation>;

    async fn get_conversation(&self, chat_id: Uuid) -> StoreResult<Option<Conversation>>;

    /// Every conversation `user_id` participates in, in no particular order
    async fn conversations_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Conversation>>;

    /// Add a participant with a zeroed unread entry. Returns false if already present.
    async fn add_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    /// Remove a participant and prune their unread entry. Returns false if absent.
    async fn remove_participant(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<bool>;

    /// Persist a message; the store assigns id and timestamp.
    async fn insert_message(&self, message: NewMessage) -> StoreResult<Message>;

    async fn get_message(&self, message_id: Uuid) -> StoreResult<Option<Message>>;

    /// Messages of a conversation, oldest first
    async fn messages_for_conversation(&self, chat_id: Uuid) -> StoreResult<Vec<Message>>;

    /// Add one to the unread counter of each listed user that is a participant.
    async fn increment_unread(&self, chat_id: Uuid, recipients: &[Uuid]) -> StoreResult<()>;

    async fn reset_unread(&self, chat_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Replace the last-message snapshot unless the stored one is newer or identical.
    async fn set_last_message_if_newer(&self, chat_id: Uuid, snapshot: &LastMessage) -> StoreResult<bool>;

    /// Move every `sent` message addressed to `recipient` to `delivered`.
    async fn deliver_pending(&self, recipient: Uuid, at: DateTime<Utc>) -> StoreResult<Vec<DeliveredBatch>>;

    /// Move every message from others in `chat_id` to `read` and record `reader`
    /// on each one it has not read yet.
    ///
    /// Returns how many messages gained a receipt.
    async fn mark_read(&self, chat_id: Uuid, reader: Uuid, at: DateTime<Utc>) -> StoreResult<u64>;
}
