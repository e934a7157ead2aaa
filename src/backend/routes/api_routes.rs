/**
 * API Routes
 *
 * ## Read side
 * - `GET /api/chats/{chat_id}/messages` - conversation history
 * - `GET /api/users/{user_id}/chats` - sorted conversation summaries
 *
 * ## Seeding
 * - `POST /api/users` - create a user
 * - `POST /api/chats` - create a direct chat or a group
 *
 * ## Groups
 * - `POST /api/chats/{chat_id}/members` - add a member
 * - `DELETE /api/chats/{chat_id}/members/{user_id}` - remove a member
 * - `POST /api/chats/{chat_id}/join-requests` - notify the group admin
 */

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::backend::chat::api::{
    add_group_member, create_chat, create_user, get_chat_messages, get_user_chats, remove_group_member,
    request_to_join,
};
use crate::backend::server::state::AppState;

pub fn configure_api_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/users", post(create_user))
        .route("/api/users/{user_id}/chats", get(get_user_chats))
        .route("/api/chats", post(create_chat))
        .route("/api/chats/{chat_id}/messages", get(get_chat_messages))
        .route("/api/chats/{chat_id}/members", post(add_group_member))
        .route("/api/chats/{chat_id}/members/{user_id}", delete(remove_group_member))
        .route("/api/chats/{chat_id}/join-requests", post(request_to_join))
}
