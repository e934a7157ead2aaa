/**
 * Message Send Orchestrator
 *
 * A send runs in two phases.
 *
 * 1. [`Orchestrator::send`] validates the request, resolves the sender and
 *    conversation, builds the provisional message and broadcasts it to the
 *    rest of the room. It returns a [`Dispatched`] holding the provisional
 *    echo for the caller. Nothing in this phase waits on persistence.
 * 2. [`Dispatched::spawn`] starts persistence on its own task. Presence
 *    decides the stored status, unread counters are bumped for recipients
 *    that are not viewing the chat, and `message-confirmed` replaces the
 *    provisional entry by temporary id. A failure to persist surfaces as
 *    `message-error` with the same temporary id.
 *
 * The caller acknowledges the sender between the two phases, so the echo
 * always reaches the sender's outbox before any confirmation can.
 */

use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::error::CoreError;
use crate::backend::presence::PresenceTracker;
use crate::backend::realtime::broadcast::{BroadcastRouter, ConnectionId, Target};
use crate::backend::store::Store;
use crate::backend::summary::SummaryProjector;
use crate::backend::viewers::ViewerTracker;
use crate::shared::conversation::Conversation;
use crate::shared::event::{
    AudioAnnouncement, MessageConfirmed, MessageFailed, ReceivedMessage, SendMessageRequest, ServerEvent,
};
use crate::shared::message::{
    MessageKind, MessageStatus, MessageWithSender, NewMessage, ProvisionalMessage, ProvisionalStatus,
};
use crate::shared::user::UserProfile;

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Temporary id, unique per connection and instant
pub fn temp_id(connection: ConnectionId) -> String {
    let seq = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("tmp-{}-{}-{}", connection.simple(), Utc::now().timestamp_millis(), seq)
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn Store>,
    router: BroadcastRouter,
    presence: PresenceTracker,
    viewers: ViewerTracker,
    projector: SummaryProjector,
    max_message_length: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        router: BroadcastRouter,
        presence: PresenceTracker,
        viewers: ViewerTracker,
        projector: SummaryProjector,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            router,
            presence,
            viewers,
            projector,
            max_message_length,
        }
    }

    fn validate(&self, request: &SendMessageRequest) -> Result<(), CoreError> {
        let content = request.content.trim();
        if content.is_empty() {
            return Err(CoreError::invalid("message content cannot be empty"));
        }
        if content.chars().count() > self.max_message_length {
            return Err(CoreError::invalid(format!(
                "message content exceeds {} characters",
                self.max_message_length
            )));
        }
        if request.kind == MessageKind::System {
            return Err(CoreError::invalid("system messages cannot be sent by clients"));
        }
        Ok(())
    }

    /// Accept a send from `origin` and broadcast the provisional message.
    ///
    /// Errors here leave no trace: nothing has been broadcast or persisted.
    pub async fn send(&self, origin: ConnectionId, request: SendMessageRequest) -> Result<Dispatched, CoreError> {
        self.validate(&request)?;

        let sender = self
            .store
            .get_user(request.sender_id)
            .await?
            .ok_or(CoreError::SenderNotFound(request.sender_id))?
            .profile();
        let conversation = self
            .store
            .get_conversation(request.chat_id)
            .await?
            .ok_or(CoreError::ConversationNotFound(request.chat_id))?;
        if !conversation.has_participant(sender.id) {
            return Err(CoreError::invalid(format!(
                "user {} is not in chat {}",
                sender.id, conversation.id
            )));
        }

        let provisional = ProvisionalMessage {
            temp_id: temp_id(origin),
            chat_id: conversation.id,
            sender: sender.clone(),
            content: request.content.trim().to_string(),
            kind: request.kind,
            status: ProvisionalStatus::Sending,
            is_optimistic: false,
            created_at: Utc::now(),
        };

        let reached = self.router.broadcast_to_conversation(
            conversation.id,
            ServerEvent::MessageReceived(ReceivedMessage::Provisional(provisional.for_recipients())),
            Some(origin),
        );
        tracing::debug!(
            "[Orchestrator] Provisional {} shown to {} connections in chat {}",
            provisional.temp_id,
            reached,
            conversation.id
        );

        Ok(Dispatched {
            provisional: provisional.clone(),
            job: PersistJob {
                orchestrator: self.clone(),
                origin,
                conversation,
                sender,
                provisional,
            },
        })
    }

    /// Broadcast an audio message that the upload path already persisted.
    pub async fn announce_audio(
        &self,
        origin: ConnectionId,
        announcement: AudioAnnouncement,
    ) -> Result<MessageWithSender, CoreError> {
        let message = self
            .store
            .get_message(announcement.message_id)
            .await?
            .ok_or(CoreError::MessageNotFound(announcement.message_id))?;
        if message.chat_id != announcement.chat_id {
            return Err(CoreError::invalid(format!(
                "message {} does not belong to chat {}",
                message.id, announcement.chat_id
            )));
        }
        let sender = self
            .store
            .get_user(message.sender_id)
            .await?
            .ok_or(CoreError::SenderNotFound(message.sender_id))?
            .profile();

        match self.projector.project(&message).await {
            Ok(summary) => {
                self.projector.publish(summary, Some(origin));
            }
            Err(e) => tracing::error!("[Orchestrator] Summary update for audio {} failed: {}", message.id, e),
        }

        let durable = MessageWithSender { message, sender };
        self.router.broadcast_to_conversation(
            durable.message.chat_id,
            ServerEvent::MessageReceived(ReceivedMessage::Durable(durable.clone())),
            Some(origin),
        );
        Ok(durable)
    }
}

/// A send whose provisional phase is complete
#[must_use = "persistence only starts when the send is spawned"]
pub struct Dispatched {
    /// Echo for the sending connection
    pub provisional: ProvisionalMessage,
    job: PersistJob,
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("provisional", &self.provisional)
            .finish_non_exhaustive()
    }
}

impl Dispatched {
    /// Persist on a separate task.
    ///
    /// The handle resolves to the durable message, or to the error that was
    /// already reported as `message-error`.
    pub fn spawn(self) -> JoinHandle<Result<MessageWithSender, CoreError>> {
        tokio::spawn(self.job.run())
    }
}

struct PersistJob {
    orchestrator: Orchestrator,
    origin: ConnectionId,
    conversation: Conversation,
    sender: UserProfile,
    provisional: ProvisionalMessage,
}

impl PersistJob {
    async fn run(self) -> Result<MessageWithSender, CoreError> {
        let core = &self.orchestrator;
        let chat_id = self.conversation.id;
        let recipients = self.conversation.recipients(self.sender.id);

        let any_online = match core.presence.any_online(&recipients).await {
            Ok(online) => online,
            Err(e) => {
                tracing::warn!("[Orchestrator] {}; storing {} as sent", e, self.provisional.temp_id);
                false
            }
        };
        let status = MessageStatus::initial(any_online);

        let new_message = NewMessage {
            chat_id,
            sender_id: self.sender.id,
            content: self.provisional.content.clone(),
            kind: self.provisional.kind,
            status,
            delivered_at: any_online.then(Utc::now),
        };
        let message = match core.store.insert_message(new_message).await {
            Ok(message) => message,
            Err(e) => {
                tracing::error!("[Orchestrator] Failed to persist {}: {}", self.provisional.temp_id, e);
                core.router.publish(
                    &[Target::Connection(self.origin), Target::conversation(chat_id)],
                    ServerEvent::MessageError(MessageFailed {
                        temp_id: self.provisional.temp_id.clone(),
                        chat_id,
                        error: "Failed to send message".to_string(),
                    }),
                    None,
                );
                return Err(CoreError::PersistenceFailure(e));
            }
        };
        tracing::info!(
            "[Orchestrator] Stored {} as {} ({}) in chat {}",
            message.id,
            self.provisional.temp_id,
            message.status,
            chat_id
        );

        let viewing: HashSet<Uuid> = core.viewers.active_viewers(chat_id);
        let unread: Vec<Uuid> = recipients.into_iter().filter(|id| !viewing.contains(id)).collect();
        if !unread.is_empty() {
            if let Err(e) = core.store.increment_unread(chat_id, &unread).await {
                tracing::error!("[Orchestrator] Unread update for {} failed: {}", message.id, e);
            }
        }

        let durable = MessageWithSender {
            message,
            sender: self.sender,
        };
        core.router.publish(
            &[Target::conversation(chat_id), Target::Connection(self.origin)],
            ServerEvent::MessageConfirmed(MessageConfirmed {
                temp_id: self.provisional.temp_id,
                message: durable.clone(),
            }),
            None,
        );

        match core.projector.project(&durable.message).await {
            Ok(summary) => {
                core.projector.publish(summary, Some(self.origin));
            }
            Err(e) => tracing::error!("[Orchestrator] Summary update for {} failed: {}", durable.message.id, e),
        }

        Ok(durable)
    }
}
