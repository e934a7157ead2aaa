//! Group membership notifications
//!
//! Membership itself is managed elsewhere; these operations apply a change
//! to the store and tell the room and the affected user about it.

use std::sync::Arc;
use uuid::Uuid;

use crate::backend::error::CoreError;
use crate::backend::realtime::broadcast::BroadcastRouter;
use crate::backend::store::Store;
use crate::backend::summary::SummaryProjector;
use crate::shared::conversation::{Conversation, ConversationKind, ConversationSummary};
use crate::shared::event::{MembershipChange, Notification, ReceivedMessage, ServerEvent};
use crate::shared::message::{MessageKind, MessageStatus, MessageWithSender, NewMessage};

#[derive(Clone)]
pub struct MembershipNotifier {
    store: Arc<dyn Store>,
    router: BroadcastRouter,
    projector: SummaryProjector,
}

impl MembershipNotifier {
    pub fn new(store: Arc<dyn Store>, router: BroadcastRouter, projector: SummaryProjector) -> Self {
        Self {
            store,
            router,
            projector,
        }
    }

    async fn group(&self, group_id: Uuid) -> Result<(Conversation, String), CoreError> {
        let conversation = self
            .store
            .get_conversation(group_id)
            .await?
            .ok_or(CoreError::ConversationNotFound(group_id))?;
        match &conversation.kind {
            ConversationKind::Group { name, .. } => {
                let name = name.clone();
                Ok((conversation, name))
            }
            ConversationKind::Direct => Err(CoreError::invalid(format!("chat {group_id} is not a group"))),
        }
    }

    /// Add `member_id` to a group, announce it with a system message and
    /// return the refreshed summary.
    ///
    /// Adding an existing member changes nothing and emits nothing.
    pub async fn add_member(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        added_by: Option<Uuid>,
    ) -> Result<ConversationSummary, CoreError> {
        let (_, group_name) = self.group(group_id).await?;
        let member = self
            .store
            .get_user(member_id)
            .await?
            .ok_or_else(|| CoreError::invalid(format!("unknown user {member_id}")))?;

        if !self.store.add_participant(group_id, member_id).await? {
            tracing::debug!("[Membership] {} already in group {}", member_id, group_id);
            return self.projector.summary(group_id).await;
        }
        tracing::info!("[Membership] {} joined group {}", member_id, group_id);

        let joined = self
            .store
            .insert_message(NewMessage {
                chat_id: group_id,
                sender_id: member_id,
                content: format!("{} joined the group", member.name),
                kind: MessageKind::System,
                status: MessageStatus::Sent,
                delivered_at: None,
            })
            .await?;
        let summary = self.projector.project(&joined).await?;

        self.router.broadcast_to_conversation(
            group_id,
            ServerEvent::MessageReceived(ReceivedMessage::Durable(MessageWithSender {
                message: joined,
                sender: member.profile(),
            })),
            None,
        );
        self.router.broadcast_to_conversation(
            group_id,
            ServerEvent::MemberJoined(MembershipChange {
                group_id,
                member_id,
                group: summary.clone(),
            }),
            None,
        );
        self.router.broadcast_to_user(
            member_id,
            ServerEvent::AddedToGroup(Notification {
                group_id,
                group_name,
                from_user_id: added_by,
            }),
        );
        self.projector.publish(summary.clone(), None);
        Ok(summary)
    }

    /// Remove `member_id` from a group. Their unread entry goes with them.
    ///
    /// The admin cannot be removed.
    pub async fn remove_member(
        &self,
        group_id: Uuid,
        member_id: Uuid,
        removed_by: Option<Uuid>,
    ) -> Result<ConversationSummary, CoreError> {
        let (group, group_name) = self.group(group_id).await?;
        if matches!(group.kind, ConversationKind::Group { admin_id, .. } if admin_id == member_id) {
            return Err(CoreError::invalid(format!("cannot remove the admin of group {group_id}")));
        }
        if !self.store.remove_participant(group_id, member_id).await? {
            return Err(CoreError::invalid(format!("user {member_id} is not in group {group_id}")));
        }
        tracing::info!("[Membership] {} removed from group {}", member_id, group_id);

        let summary = self.projector.summary(group_id).await?;
        self.router.broadcast_to_conversation(
            group_id,
            ServerEvent::MemberRemoved(MembershipChange {
                group_id,
                member_id,
                group: summary.clone(),
            }),
            None,
        );
        self.router.broadcast_to_user(
            member_id,
            ServerEvent::RemovedFromGroup(Notification {
                group_id,
                group_name,
                from_user_id: removed_by,
            }),
        );
        self.projector.publish(summary.clone(), None);
        Ok(summary)
    }

    /// Tell the group admin that `requester` wants in. Returns the connections reached.
    pub async fn notify_join_request(&self, admin_id: Uuid, group_id: Uuid, requester: Uuid) -> Result<usize, CoreError> {
        let (_, group_name) = self.group(group_id).await?;
        let reached = self.router.broadcast_to_user(
            admin_id,
            ServerEvent::JoinRequest(Notification {
                group_id,
                group_name,
                from_user_id: Some(requester),
            }),
        );
        tracing::debug!("[Membership] Join request for {} reached {} connections", group_id, reached);
        Ok(reached)
    }
}
