/**
 * WebSocket Connection Handler
 *
 * `GET /ws` upgrades to a WebSocket. Each socket is split in two:
 *
 * - a writer task that drains the connection's router outbox and writes
 *   every event as a JSON text frame
 * - the reader loop below, which decodes client frames and hands them to
 *   the chat handlers one at a time
 *
 * When the client goes away the reader loop ends, the connection's viewer
 * record, presence binding and subscriptions are released, and the writer
 * task stops once its outbox is dropped.
 */

use axum::{
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};

use crate::backend::chat::handlers::{handle_client_event, handle_disconnect};
use crate::backend::realtime::broadcast::{ConnectionId, Outbox};
use crate::backend::server::state::AppState;
use crate::shared::event::{parse_client_frame, Ack, ServerEvent};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection, outbox) = state.router.connect();
    let (ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(write_outbox(connection, outbox, ws_sender));
    tracing::info!("[Socket] Connection {} opened", connection);

    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("[Socket] Read error on {}: {}", connection, e);
                break;
            }
        };

        match parse_client_frame(text.as_str()) {
            Ok((ack, event)) => {
                // Persistence runs detached; its outcome reaches clients as events.
                let _ = handle_client_event(&state, connection, ack, event).await;
            }
            Err(e) => {
                tracing::warn!("[Socket] Bad frame from {}: {}", connection, e);
                if let Some(id) = frame_ack_id(text.as_str()) {
                    state
                        .router
                        .send_to_connection(connection, ServerEvent::Ack(Ack::error(id, e.to_string())));
                }
            }
        }
    }

    let user_id = handle_disconnect(&state, connection).await;
    if let Err(e) = writer.await {
        tracing::error!("[Socket] Writer task for {} failed: {}", connection, e);
    }
    tracing::info!("[Socket] Connection {} closed (user {:?})", connection, user_id);
}

async fn write_outbox<S>(connection: ConnectionId, mut outbox: Outbox, mut sink: S)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    while let Some(event) = outbox.recv().await {
        let json = match event.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("[Socket] Could not encode {} for {}: {}", event.name(), connection, e);
                continue;
            }
        };
        if sink.send(WsMessage::Text(json.into())).await.is_err() {
            tracing::debug!("[Socket] {} stopped accepting frames", connection);
            break;
        }
    }
    let _ = sink.close().await;
}

/// Best-effort ack id of a frame that failed to decode
fn frame_ack_id(text: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("ack")?
        .as_u64()
}
