/**
 * Realtime Event Handlers
 *
 * Maps each client event of one connection onto the messaging core and
 * answers with an `ack` frame when the client asked for one.
 *
 * # Send ordering
 *
 * For `send-message` the ack (carrying the provisional message) is pushed
 * into the connection's outbox before persistence is spawned. The outbox is
 * FIFO, so the sender always sees its echo before `message-confirmed` or
 * `message-error` for the same temporary id.
 */

use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::error::CoreError;
use crate::backend::realtime::broadcast::ConnectionId;
use crate::backend::server::state::AppState;
use crate::shared::event::{Ack, ClientEvent, ReceivedMessage, ServerEvent};
use crate::shared::message::MessageWithSender;

/// Handle of a spawned persistence job
pub type PersistHandle = JoinHandle<Result<MessageWithSender, CoreError>>;

/// Handle one client event from `connection`.
///
/// Returns the persistence handle when the event started a send.
pub async fn handle_client_event(
    state: &AppState,
    connection: ConnectionId,
    ack: Option<u64>,
    event: ClientEvent,
) -> Option<PersistHandle> {
    let name = event.name();
    tracing::debug!("[Socket] {} from {}", name, connection);

    if let ClientEvent::SendMessage(request) = event {
        return match state.orchestrator.send(connection, request).await {
            Ok(dispatched) => {
                let echo = match ack {
                    Some(id) => ServerEvent::Ack(Ack::provisional(id, dispatched.provisional.clone())),
                    None => ServerEvent::MessageReceived(ReceivedMessage::Provisional(dispatched.provisional.clone())),
                };
                state.router.send_to_connection(connection, echo);
                Some(dispatched.spawn())
            }
            Err(e) => {
                reply(state, connection, ack, name, Err(e));
                None
            }
        };
    }

    let result = match event {
        ClientEvent::JoinChat(chat_id) => {
            state.router.join(connection, chat_id);
            Ok(())
        }
        ClientEvent::LeaveChat(chat_id) => {
            state.router.leave(connection, chat_id);
            Ok(())
        }
        ClientEvent::SendAudioMessage(announcement) => state
            .orchestrator
            .announce_audio(connection, announcement)
            .await
            .map(|_| ()),
        ClientEvent::UserOnline(user_id) => state.presence.set_online(connection, user_id).await.map(|_| ()),
        ClientEvent::ViewingChat(viewing) => {
            state.viewers.set_viewing(connection, viewing.chat_id, viewing.user_id);
            Ok(())
        }
        ClientEvent::LeftChatView => {
            state.viewers.clear_viewing(connection);
            Ok(())
        }
        ClientEvent::MarkMessagesRead(read) => state
            .delivery
            .mark_messages_read(read.chat_id, read.user_id)
            .await
            .map(|_| ()),
        ClientEvent::MarkChatRead(read) => {
            state
                .delivery
                .mark_chat_read(Some(connection), read.chat_id, read.user_id)
                .await
        }
        ClientEvent::SendMessage(_) => Ok(()),
    };
    reply(state, connection, ack, name, result);
    None
}

fn reply(state: &AppState, connection: ConnectionId, ack: Option<u64>, name: &str, result: Result<(), CoreError>) {
    let frame = match (ack, result) {
        (Some(id), Ok(())) => Ack::success(id),
        (Some(id), Err(e)) => {
            tracing::warn!("[Socket] {} from {} failed: {}", name, connection, e);
            Ack::error(id, e.to_string())
        }
        (None, Ok(())) => return,
        (None, Err(e)) => {
            tracing::warn!("[Socket] {} from {} failed without ack: {}", name, connection, e);
            return;
        }
    };
    state.router.send_to_connection(connection, ServerEvent::Ack(frame));
}

/// Tear down everything a closed connection held.
///
/// A stale presence binding is expected here when the user reconnected
/// from another connection first.
pub async fn handle_disconnect(state: &AppState, connection: ConnectionId) -> Option<Uuid> {
    state.viewers.clear_viewing(connection);
    let user_id = match state.presence.set_offline(connection).await {
        Ok(user) => Some(user.id),
        Err(CoreError::StaleConnectionHandle(_)) => {
            tracing::debug!("[Socket] {} closed without holding a presence binding", connection);
            None
        }
        Err(e) => {
            tracing::error!("[Socket] Presence release for {} failed: {}", connection, e);
            None
        }
    };
    state.router.disconnect(connection);
    user_id
}
