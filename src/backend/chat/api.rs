/**
 * Chat REST Handlers
 *
 * Read-side and seeding endpoints around the realtime core.
 *
 * - `GET /api/chats/{chat_id}/messages` - history, oldest first, with sender profiles
 * - `GET /api/users/{user_id}/chats` - sidebar list, newest activity first
 * - `POST /api/users` / `POST /api/chats` - create users and conversations
 * - `POST|DELETE /api/chats/{chat_id}/members` - group membership changes
 * - `POST /api/chats/{chat_id}/join-requests` - ask the group admin to add a user
 */

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::backend::error::BackendError;
use crate::backend::server::state::AppState;
use crate::shared::conversation::{Conversation, ConversationKind, ConversationSummary};
use crate::shared::message::MessageWithSender;
use crate::shared::user::{User, UserProfile};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
}

/// Body of `POST /api/chats`. A `name` makes it a group.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub participants: Vec<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRequest {
    pub user_id: Uuid,
    #[serde(default)]
    pub acting_user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestResponse {
    pub admin_id: Uuid,
    pub notified_connections: usize,
}

/// Get the message history of a conversation
pub async fn get_chat_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Vec<MessageWithSender>>, BackendError> {
    if state.store.get_conversation(chat_id).await?.is_none() {
        return Err(BackendError::not_found(format!("chat {chat_id} not found")));
    }
    let messages = state.store.messages_for_conversation(chat_id).await?;

    let mut profiles: HashMap<Uuid, UserProfile> = HashMap::new();
    let mut history = Vec::with_capacity(messages.len());
    for message in messages {
        if !profiles.contains_key(&message.sender_id) {
            match state.store.get_user(message.sender_id).await? {
                Some(user) => {
                    profiles.insert(user.id, user.profile());
                }
                None => {
                    tracing::warn!("[Http] Message {} has no sender {}", message.id, message.sender_id);
                    continue;
                }
            }
        }
        if let Some(sender) = profiles.get(&message.sender_id) {
            history.push(MessageWithSender {
                sender: sender.clone(),
                message,
            });
        }
    }
    Ok(Json(history))
}

/// Get a user's conversations, most recent activity first
pub async fn get_user_chats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ConversationSummary>>, BackendError> {
    Ok(Json(state.projector.list_for_user(user_id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), BackendError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(BackendError::handler(StatusCode::BAD_REQUEST, "name cannot be empty"));
    }
    let user = state.store.insert_user(User::new(name, request.picture_url)).await?;
    tracing::info!("[Http] Created user {} ({})", user.id, user.name);
    Ok((StatusCode::CREATED, Json(user)))
}

/// Create a direct chat (exactly two participants) or a named group
pub async fn create_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ConversationSummary>), BackendError> {
    for &participant in &request.participants {
        if state.store.get_user(participant).await?.is_none() {
            return Err(BackendError::handler(
                StatusCode::BAD_REQUEST,
                format!("unknown participant {participant}"),
            ));
        }
    }

    let conversation = match request.name {
        Some(name) => {
            let admin_id = request
                .admin_id
                .or_else(|| request.participants.first().copied())
                .ok_or_else(|| BackendError::handler(StatusCode::BAD_REQUEST, "a group needs a member"))?;
            let mut participants = request.participants;
            if !participants.contains(&admin_id) {
                participants.insert(0, admin_id);
            }
            Conversation::new(ConversationKind::Group { name, admin_id }, participants)
        }
        None => match request.participants.as_slice() {
            [first, second] if first != second => Conversation::new_direct(*first, *second),
            _ => {
                return Err(BackendError::handler(
                    StatusCode::BAD_REQUEST,
                    "a direct chat needs two distinct participants",
                ))
            }
        },
    };

    let conversation = state.store.insert_conversation(conversation).await?;
    let summary = conversation.summary(state.config.preview_length);
    state.projector.publish(summary.clone(), None);
    tracing::info!("[Http] Created chat {} with {} participants", summary.id, summary.participants.len());
    Ok((StatusCode::CREATED, Json(summary)))
}

pub async fn add_group_member(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<MemberRequest>,
) -> Result<Json<ConversationSummary>, BackendError> {
    let summary = state
        .membership
        .add_member(chat_id, request.user_id, request.acting_user_id)
        .await?;
    Ok(Json(summary))
}

pub async fn remove_group_member(
    State(state): State<AppState>,
    Path((chat_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ConversationSummary>, BackendError> {
    Ok(Json(state.membership.remove_member(chat_id, user_id, None).await?))
}

pub async fn request_to_join(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<MemberRequest>,
) -> Result<Json<JoinRequestResponse>, BackendError> {
    let conversation = state
        .store
        .get_conversation(chat_id)
        .await?
        .ok_or_else(|| BackendError::not_found(format!("chat {chat_id} not found")))?;
    let ConversationKind::Group { admin_id, .. } = conversation.kind else {
        return Err(BackendError::handler(StatusCode::BAD_REQUEST, "only groups take join requests"));
    };
    let notified_connections = state
        .membership
        .notify_join_request(admin_id, chat_id, request.user_id)
        .await?;
    Ok(Json(JoinRequestResponse {
        admin_id,
        notified_connections,
    }))
}
