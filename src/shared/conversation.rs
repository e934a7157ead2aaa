//! Conversation Data Structure
//!
//! A private chat and a group chat are the same thing to the messaging
//! core: an ordered set of participants, a denormalized last-message
//! preview, and one unread counter per participant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::shared::message::{Message, MessageKind};

/// Private (1:1) or group conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ConversationKind {
    Direct,
    Group {
        name: String,
        admin_id: Uuid,
    },
}

/// Snapshot of the newest message, used for sidebar previews
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

impl LastMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender_id: message.sender_id,
            kind: message.kind,
            created_at: message.created_at,
        }
    }

    /// Text shown in the conversation list
    pub fn preview(&self, max_len: usize) -> String {
        match self.kind {
            MessageKind::Audio => "Voice message".to_string(),
            MessageKind::Text | MessageKind::System => {
                if self.content.chars().count() <= max_len {
                    self.content.clone()
                } else {
                    let mut preview: String =
                        self.content.chars().take(max_len.saturating_sub(3)).collect();
                    preview.push_str("...");
                    preview
                }
            }
        }
    }
}

/// A conversation as stored by the persistence gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ConversationKind,
    /// Unique, in join order
    pub participants: Vec<Uuid>,
    pub last_message: Option<LastMessage>,
    /// One entry per current participant
    pub unread_count: BTreeMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a conversation, deduplicating participants while keeping their order.
    pub fn new(kind: ConversationKind, participants: Vec<Uuid>) -> Self {
        let now = Utc::now();
        let mut conversation = Self {
            id: Uuid::new_v4(),
            kind,
            participants: Vec::with_capacity(participants.len()),
            last_message: None,
            unread_count: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        for participant in participants {
            conversation.add_participant(participant);
        }
        conversation
    }

    /// Create a private conversation between two users
    pub fn new_direct(user1: Uuid, user2: Uuid) -> Self {
        Self::new(ConversationKind::Direct, vec![user1, user2])
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ConversationKind::Group { .. })
    }

    /// Check if user is a participant
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// Everyone except `sender`
    pub fn recipients(&self, sender: Uuid) -> Vec<Uuid> {
        self.participants
            .iter()
            .copied()
            .filter(|&id| id != sender)
            .collect()
    }

    /// Adds a participant with a zeroed unread entry. Returns false if already present.
    pub fn add_participant(&mut self, user_id: Uuid) -> bool {
        if self.has_participant(user_id) {
            return false;
        }
        self.participants.push(user_id);
        self.unread_count.entry(user_id).or_insert(0);
        true
    }

    /// Removes a participant and prunes their unread entry.
    pub fn remove_participant(&mut self, user_id: Uuid) -> bool {
        let before = self.participants.len();
        self.participants.retain(|&id| id != user_id);
        self.unread_count.remove(&user_id);
        self.participants.len() != before
    }

    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.unread_count.get(&user_id).copied().unwrap_or(0)
    }

    /// Add one unread message for every listed participant.
    ///
    /// Ids that are not participants are skipped so a removed member never
    /// regains an entry.
    pub fn increment_unread(&mut self, recipients: &[Uuid]) {
        for recipient in recipients {
            if self.participants.contains(recipient) {
                *self.unread_count.entry(*recipient).or_insert(0) += 1;
            }
        }
    }

    pub fn reset_unread(&mut self, user_id: Uuid) {
        if self.has_participant(user_id) {
            self.unread_count.insert(user_id, 0);
        }
    }

    /// Replace the preview unless the stored one is newer. Returns whether it changed.
    pub fn apply_last_message(&mut self, snapshot: LastMessage) -> bool {
        match &self.last_message {
            Some(current) if current.created_at > snapshot.created_at => false,
            Some(current) if *current == snapshot => false,
            _ => {
                self.updated_at = snapshot.created_at.max(self.updated_at);
                self.last_message = Some(snapshot);
                true
            }
        }
    }

    /// Sort key for conversation lists: newest activity first
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.created_at)
    }

    /// List entry with a preview cut to `preview_length` characters
    pub fn summary(&self, preview_length: usize) -> ConversationSummary {
        ConversationSummary {
            id: self.id,
            kind: self.kind.clone(),
            participants: self.participants.clone(),
            preview: self.last_message.as_ref().map(|m| m.preview(preview_length)),
            last_message: self.last_message.clone(),
            unread_count: self.unread_count.clone(),
            activity_at: self.activity_at(),
            created_at: self.created_at,
        }
    }
}

/// Payload of `chat-updated` and entry of a conversation list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    #[serde(flatten)]
    pub kind: ConversationKind,
    pub participants: Vec<Uuid>,
    pub last_message: Option<LastMessage>,
    /// Sidebar text derived from `last_message`
    pub preview: Option<String>,
    pub unread_count: BTreeMap<Uuid, u32>,
    /// `lastMessage.createdAt`, or `createdAt` for an empty conversation
    pub activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Sort newest activity first
pub fn sort_by_activity(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| b.activity_at.cmp(&a.activity_at));
}
