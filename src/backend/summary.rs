//! Chat/Group Summary Projector
//!
//! Keeps each conversation's last-message snapshot in step with confirmed
//! messages and pushes `chat-updated` so sidebars re-sort.

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::CoreError;
use crate::backend::realtime::broadcast::{BroadcastRouter, ConnectionId, Target};
use crate::backend::store::Store;
use crate::shared::conversation::{sort_by_activity, ConversationSummary, LastMessage};
use crate::shared::event::ServerEvent;
use crate::shared::message::Message;

#[derive(Clone)]
pub struct SummaryProjector {
    store: Arc<dyn Store>,
    router: BroadcastRouter,
    preview_length: usize,
}

impl SummaryProjector {
    pub fn new(store: Arc<dyn Store>, router: BroadcastRouter, preview_length: usize) -> Self {
        Self {
            store,
            router,
            preview_length,
        }
    }

    /// Fold `message` into its conversation's snapshot and return the fresh summary.
    ///
    /// The snapshot only moves forward in time, so projecting the same or an
    /// older message again leaves it unchanged.
    pub async fn project(&self, message: &Message) -> Result<ConversationSummary, CoreError> {
        let changed = self
            .store
            .set_last_message_if_newer(message.chat_id, &LastMessage::from_message(message))
            .await?;
        if !changed {
            tracing::debug!("[Summary] Chat {} already has a newer preview than {}", message.chat_id, message.id);
        }
        self.summary(message.chat_id).await
    }

    pub async fn summary(&self, chat_id: Uuid) -> Result<ConversationSummary, CoreError> {
        self.store
            .get_conversation(chat_id)
            .await?
            .map(|conversation| conversation.summary(self.preview_length))
            .ok_or(CoreError::ConversationNotFound(chat_id))
    }

    /// Send `chat-updated` to the room, every participant's own topic and `origin`.
    pub fn publish(&self, summary: ConversationSummary, origin: Option<ConnectionId>) -> usize {
        let mut targets: Vec<Target> = Vec::with_capacity(summary.participants.len() + 2);
        targets.push(Target::conversation(summary.id));
        targets.extend(summary.participants.iter().map(|&user| Target::user(user)));
        targets.extend(origin.map(Target::Connection));
        self.router.publish(&targets, ServerEvent::ChatUpdated(summary), None)
    }

    /// Conversations of `user_id`, newest activity first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ConversationSummary>, CoreError> {
        let mut summaries: Vec<ConversationSummary> = self
            .store
            .conversations_for_user(user_id)
            .await?
            .iter()
            .map(|conversation| conversation.summary(self.preview_length))
            .collect();
        sort_by_activity(&mut summaries);
        Ok(summaries)
    }
}
