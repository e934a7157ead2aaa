//! In-process stand-in for a WebSocket client

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use peerchat::backend::chat::{handle_client_event, handle_disconnect, PersistHandle};
use peerchat::backend::realtime::broadcast::{ConnectionId, Outbox};
use peerchat::backend::server::state::AppState;
use peerchat::shared::event::{ChatUser, ClientEvent, SendMessageRequest, ServerEvent};
use peerchat::shared::message::MessageKind;

/// A registered router connection that sends events through the same
/// handlers the socket uses and keeps everything it receives.
pub struct TestClient {
    pub connection: ConnectionId,
    state: AppState,
    outbox: Outbox,
}

impl TestClient {
    pub fn connect(state: &AppState) -> Self {
        let (connection, outbox) = state.router.connect();
        Self {
            connection,
            state: state.clone(),
            outbox,
        }
    }

    pub async fn emit(&self, ack: Option<u64>, event: ClientEvent) -> Option<PersistHandle> {
        handle_client_event(&self.state, self.connection, ack, event).await
    }

    pub async fn online(&self, user_id: Uuid) {
        self.emit(None, ClientEvent::UserOnline(user_id)).await;
    }

    pub async fn join(&self, chat_id: Uuid) {
        self.emit(None, ClientEvent::JoinChat(chat_id)).await;
    }

    pub async fn view(&self, chat_id: Uuid, user_id: Uuid) {
        self.emit(None, ClientEvent::ViewingChat(ChatUser { chat_id, user_id })).await;
    }

    /// Send a text message with an ack id and return the persistence handle
    pub async fn send(&self, ack: u64, chat_id: Uuid, sender_id: Uuid, content: &str) -> Option<PersistHandle> {
        let request = SendMessageRequest {
            chat_id,
            sender_id,
            content: content.to_string(),
            kind: MessageKind::Text,
        };
        self.emit(Some(ack), ClientEvent::SendMessage(request)).await
    }

    pub async fn disconnect(self) -> Option<Uuid> {
        handle_disconnect(&self.state, self.connection).await
    }

    /// Everything received so far, in arrival order
    pub fn drain(&mut self) -> Vec<Arc<ServerEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = self.outbox.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait up to `wait` for the next event
    pub async fn next(&mut self, wait: Duration) -> Option<Arc<ServerEvent>> {
        tokio::time::timeout(wait, self.outbox.recv()).await.ok().flatten()
    }
}
