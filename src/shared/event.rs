/**
 * Real-time Event System
 *
 * This module defines the events exchanged over a realtime connection.
 * Every frame is a JSON object `{"event": <name>, "data": <payload>}`;
 * client frames may carry an extra `ack` number that the server echoes
 * back in the matching `ack` event.
 *
 * # Client → Server
 *
 * `join-chat`, `leave-chat`, `send-message`, `send-audio-message`,
 * `user-online`, `viewing-chat`, `left-chat-view`, `mark-messages-read`,
 * `mark-chat-read`
 *
 * # Server → Client
 *
 * `ack`, `message-received`, `message-confirmed`, `message-error`,
 * `chat-updated`, `messages-delivered`, `messages-read`,
 * `user-status-changed`, `chat-marked-read`, plus membership and
 * notification events
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::conversation::ConversationSummary;
use crate::shared::error::SharedError;
use crate::shared::message::{MessageKind, MessageWithSender, ProvisionalMessage};
use crate::shared::user::PresenceChange;

/// Events a client sends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinChat(Uuid),
    LeaveChat(Uuid),
    SendMessage(SendMessageRequest),
    SendAudioMessage(AudioAnnouncement),
    UserOnline(Uuid),
    ViewingChat(ChatUser),
    LeftChatView,
    MarkMessagesRead(ChatUser),
    MarkChatRead(ChatUser),
}

impl ClientEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinChat(_) => "join-chat",
            ClientEvent::LeaveChat(_) => "leave-chat",
            ClientEvent::SendMessage(_) => "send-message",
            ClientEvent::SendAudioMessage(_) => "send-audio-message",
            ClientEvent::UserOnline(_) => "user-online",
            ClientEvent::ViewingChat(_) => "viewing-chat",
            ClientEvent::LeftChatView => "left-chat-view",
            ClientEvent::MarkMessagesRead(_) => "mark-messages-read",
            ClientEvent::MarkChatRead(_) => "mark-chat-read",
        }
    }
}

/// Payload of `send-message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

/// Payload of `send-audio-message`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioAnnouncement {
    pub message_id: Uuid,
    pub chat_id: Uuid,
}

/// A (conversation, user) pair, used by viewing and read events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub chat_id: Uuid,
    pub user_id: Uuid,
}

/// Wire shape of a client frame before the event is decoded
#[derive(Debug, Deserialize)]
struct RawClientFrame {
    #[serde(default)]
    ack: Option<u64>,
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode a client text frame into its ack id and event
pub fn parse_client_frame(text: &str) -> Result<(Option<u64>, ClientEvent), SharedError> {
    let raw: RawClientFrame = serde_json::from_str(text)?;
    let tagged = if raw.data.is_null() {
        serde_json::json!({ "event": raw.event })
    } else {
        serde_json::json!({ "event": raw.event, "data": raw.data })
    };
    let event = serde_json::from_value(tagged)?;
    Ok((raw.ack, event))
}

/// Outcome reported in an acknowledgement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Success,
    Error,
}

/// Reply to a client frame that carried an `ack` id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub id: u64,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ProvisionalMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn success(id: u64) -> Self {
        Self {
            id,
            status: AckStatus::Success,
            temp_id: None,
            message: None,
            error: None,
        }
    }

    /// Acknowledge a send with the provisional echo
    pub fn provisional(id: u64, message: ProvisionalMessage) -> Self {
        Self {
            temp_id: Some(message.temp_id.clone()),
            message: Some(message),
            ..Self::success(id)
        }
    }

    pub fn error(id: u64, error: impl Into<String>) -> Self {
        Self {
            id,
            status: AckStatus::Error,
            temp_id: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Payload of `message-received`
///
/// Optimistic broadcasts carry the provisional message; audio announcements
/// carry the already persisted one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ReceivedMessage {
    Provisional(ProvisionalMessage),
    Durable(MessageWithSender),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageConfirmed {
    pub temp_id: String,
    pub message: MessageWithSender,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageFailed {
    pub temp_id: String,
    pub chat_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesDelivered {
    pub chat_id: Uuid,
    pub recipient_user_id: Uuid,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesRead {
    pub chat_id: Uuid,
    pub reader_user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Payload of membership events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MembershipChange {
    pub group_id: Uuid,
    pub member_id: Uuid,
    pub group: ConversationSummary,
}

/// Out-of-conversation notice delivered on a user's own channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub group_id: Uuid,
    pub group_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<Uuid>,
}

/// Events the server pushes to connections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Ack(Ack),
    MessageReceived(ReceivedMessage),
    MessageConfirmed(MessageConfirmed),
    MessageError(MessageFailed),
    ChatUpdated(ConversationSummary),
    MessagesDelivered(MessagesDelivered),
    MessagesRead(MessagesRead),
    UserStatusChanged(PresenceChange),
    ChatMarkedRead(ChatUser),
    MemberJoined(MembershipChange),
    MemberRemoved(MembershipChange),
    AddedToGroup(Notification),
    RemovedFromGroup(Notification),
    JoinRequest(Notification),
}

impl ServerEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Ack(_) => "ack",
            ServerEvent::MessageReceived(_) => "message-received",
            ServerEvent::MessageConfirmed(_) => "message-confirmed",
            ServerEvent::MessageError(_) => "message-error",
            ServerEvent::ChatUpdated(_) => "chat-updated",
            ServerEvent::MessagesDelivered(_) => "messages-delivered",
            ServerEvent::MessagesRead(_) => "messages-read",
            ServerEvent::UserStatusChanged(_) => "user-status-changed",
            ServerEvent::ChatMarkedRead(_) => "chat-marked-read",
            ServerEvent::MemberJoined(_) => "member-joined",
            ServerEvent::MemberRemoved(_) => "member-removed",
            ServerEvent::AddedToGroup(_) => "added-to-group",
            ServerEvent::RemovedFromGroup(_) => "removed-from-group",
            ServerEvent::JoinRequest(_) => "join-request",
        }
    }

    pub fn to_json(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }
}
