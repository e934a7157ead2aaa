//! Delivery/Read State Machine
//!
//! ```text
//! sending ──► sent ──► delivered ──► read
//! ```
//!
//! `sent → delivered` happens at persistence time when a recipient is
//! online, or here in bulk when a recipient comes online later.
//! `sent|delivered → read` happens when a recipient marks a conversation
//! read. The store guards every transition on the current status, so a
//! message never moves backwards and repeated calls change nothing.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::CoreError;
use crate::backend::realtime::broadcast::{BroadcastRouter, ConnectionId, Target};
use crate::backend::store::{DeliveredBatch, Store};
use crate::shared::event::{ChatUser, MessagesDelivered, MessagesRead, ServerEvent};

#[derive(Clone)]
pub struct DeliveryStateMachine {
    store: Arc<dyn Store>,
    router: BroadcastRouter,
}

impl DeliveryStateMachine {
    pub fn new(store: Arc<dyn Store>, router: BroadcastRouter) -> Self {
        Self { store, router }
    }

    /// Deliver everything that waited for `recipient` to come online.
    ///
    /// Each affected conversation gets one `messages-delivered`, sent to the
    /// room and to the own topic of every sender whose messages moved.
    pub async fn backfill_on_online(&self, recipient: Uuid) -> Result<Vec<DeliveredBatch>, CoreError> {
        let delivered_at = Utc::now();
        let batches = self.store.deliver_pending(recipient, delivered_at).await?;

        for batch in &batches {
            tracing::info!(
                "[Delivery] {} messages in chat {} delivered to {}",
                batch.count,
                batch.chat_id,
                recipient
            );
            let mut targets = vec![Target::conversation(batch.chat_id)];
            targets.extend(batch.sender_ids.iter().map(|&sender| Target::user(sender)));
            self.router.publish(
                &targets,
                ServerEvent::MessagesDelivered(MessagesDelivered {
                    chat_id: batch.chat_id,
                    recipient_user_id: recipient,
                    delivered_at,
                }),
                None,
            );
        }
        Ok(batches)
    }

    /// Mark every message from others in `chat_id` as read by `reader`.
    ///
    /// Returns how many messages changed; the room is only told when that is non-zero.
    pub async fn mark_messages_read(&self, chat_id: Uuid, reader: Uuid) -> Result<u64, CoreError> {
        self.require_participant(chat_id, reader).await?;

        let read_at = Utc::now();
        let changed = self.store.mark_read(chat_id, reader, read_at).await?;
        if changed > 0 {
            tracing::debug!("[Delivery] {} read {} messages in chat {}", reader, changed, chat_id);
            self.router.broadcast_to_conversation(
                chat_id,
                ServerEvent::MessagesRead(MessagesRead {
                    chat_id,
                    reader_user_id: reader,
                    read_at,
                }),
                None,
            );
        }
        Ok(changed)
    }

    /// Reset `user_id`'s unread counter and tell only that user.
    pub async fn mark_chat_read(&self, origin: Option<ConnectionId>, chat_id: Uuid, user_id: Uuid) -> Result<(), CoreError> {
        self.require_participant(chat_id, user_id).await?;
        self.store.reset_unread(chat_id, user_id).await?;

        let mut targets = vec![Target::user(user_id)];
        targets.extend(origin.map(Target::Connection));
        self.router
            .publish(&targets, ServerEvent::ChatMarkedRead(ChatUser { chat_id, user_id }), None);
        Ok(())
    }

    async fn require_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<(), CoreError> {
        let conversation = self
            .store
            .get_conversation(chat_id)
            .await?
            .ok_or(CoreError::ConversationNotFound(chat_id))?;
        if conversation.has_participant(user_id) {
            Ok(())
        } else {
            Err(CoreError::invalid(format!("user {user_id} is not in chat {chat_id}")))
        }
    }
}
