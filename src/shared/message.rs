//! Message Data Structures
//!
//! Durable messages, their delivery/read lifecycle, and the provisional
//! placeholder a sender sees before persistence confirms the message.
//!
//! # Lifecycle
//!
//! ```text
//! sending ──► sent ──► delivered ──► read
//! ```
//!
//! `sending` only exists on provisional messages. Every transition on a
//! durable [`Message`] goes through [`Message::mark_delivered`] or
//! [`Message::mark_read_by`], which refuse to move the status backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::shared::error::SharedError;
use crate::shared::user::UserProfile;

/// Delivery/read status of a message
///
/// Variants are declared in lifecycle order so that `Ord` matches the
/// direction a status is allowed to move in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Provisional only, never persisted
    Sending,
    /// Persisted, no recipient was online
    Sent,
    /// At least one recipient was online (or came online later)
    Delivered,
    /// A recipient marked the conversation read
    Read,
}

impl MessageStatus {
    /// Status a message is persisted with, given the presence check made at send time.
    pub fn initial(any_recipient_online: bool) -> Self {
        if any_recipient_online {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
        }
    }

    /// Whether moving from `self` to `next` goes forward.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        next > *self
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "delivered" => Ok(MessageStatus::Delivered),
            "read" => Ok(MessageStatus::Read),
            other => Err(SharedError::validation("status", format!("unknown status '{other}'"))),
        }
    }
}

/// Kind of message content
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// Content is the URL of an uploaded audio clip
    Audio,
    /// Generated by the server (e.g. "joined the group")
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Audio => "audio",
            MessageKind::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "audio" => Ok(MessageKind::Audio),
            "system" => Ok(MessageKind::System),
            other => Err(SharedError::validation("type", format!("unsupported message type '{other}'"))),
        }
    }
}

/// One reader's acknowledgement of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// A persisted message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id
    pub id: Uuid,
    /// Conversation this message belongs to
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    /// Append-only, at most one receipt per reader
    pub read_by: Vec<ReadReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Build the durable record for a send that is about to be persisted.
    pub fn from_new(new: NewMessage, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content,
            kind: new.kind,
            status: new.status,
            delivered_at: new.delivered_at,
            read_by: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// `sent → delivered`. Returns whether the message changed.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != MessageStatus::Sent {
            return false;
        }
        self.status = MessageStatus::Delivered;
        self.delivered_at = Some(at);
        self.updated_at = at;
        true
    }

    /// `sent|delivered → read`, recording `reader` in `read_by`.
    ///
    /// A message that is already `read` keeps its status but still gains a
    /// receipt for a reader it has not seen. Returns false when `reader`
    /// was already recorded or the message is still provisional.
    pub fn mark_read_by(&mut self, reader: Uuid, at: DateTime<Utc>) -> bool {
        if self.status == MessageStatus::Sending || self.is_read_by(reader) {
            return false;
        }
        self.status = MessageStatus::Read;
        self.read_by.push(ReadReceipt { user_id: reader, read_at: at });
        self.updated_at = at;
        true
    }

    pub fn is_read_by(&self, user_id: Uuid) -> bool {
        self.read_by.iter().any(|r| r.user_id == user_id)
    }
}

/// Values the orchestrator hands to the persistence gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// A durable message together with the sender's public profile
///
/// This is the shape clients render; it replaces the provisional entry
/// on `message-confirmed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithSender {
    #[serde(flatten)]
    pub message: Message,
    pub sender: UserProfile,
}

/// Status a provisional message is displayed with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionalStatus {
    /// Echoed back to the sender, persistence still in flight
    Sending,
    /// Shown to the other connections in the room
    Delivered,
}

/// Client-visible placeholder for a message that is not persisted yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionalMessage {
    /// Temporary id, replaced by the durable id on confirmation
    pub temp_id: String,
    pub chat_id: Uuid,
    pub sender: UserProfile,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub status: ProvisionalStatus,
    pub is_optimistic: bool,
    pub created_at: DateTime<Utc>,
}

impl ProvisionalMessage {
    /// Copy of this placeholder as the other participants should see it.
    pub fn for_recipients(&self) -> Self {
        Self {
            status: ProvisionalStatus::Delivered,
            is_optimistic: true,
            ..self.clone()
        }
    }
}
