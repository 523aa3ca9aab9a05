use crate::error::RelayError;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use netsim_protocol::ClientMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    // The transport ceiling sits above the event limit so that a moderately
    // oversized event is refused on its own instead of killing the socket
    let transport_limit = state.config.max_message_bytes.saturating_mul(2);
    ws.max_message_size(transport_limit)
        .max_frame_size(transport_limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4();

    // Create channel for outbound messages
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    state.connections.add_connection(connection_id, tx).await;

    tracing::info!("WebSocket connection {} opened", connection_id);

    // Spawn task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Events from one connection are applied strictly in arrival order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) if text.as_str().len() > state.config.max_message_bytes => {
                let size = text.as_str().len();
                tracing::warn!("Dropping {}-byte event from {}", size, connection_id);
                state
                    .relay
                    .reject(
                        connection_id,
                        RelayError::PayloadTooLarge {
                            size,
                            limit: state.config.max_message_bytes,
                        },
                    )
                    .await;
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    tracing::debug!(
                        "Received {} from {}",
                        client_msg.event_name(),
                        connection_id
                    );
                    state.relay.handle(connection_id, client_msg).await;
                }
                Err(e) => {
                    tracing::warn!("Invalid message from {}: {}", connection_id, e);
                    state
                        .relay
                        .reject(connection_id, RelayError::MalformedEvent(e.to_string()))
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                state
                    .relay
                    .reject(
                        connection_id,
                        RelayError::MalformedEvent("binary frames are not supported".to_string()),
                    )
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
            _ => {}
        }
    }

    // Closing is an implicit leave; announce it before dropping the queue
    state.relay.disconnect(connection_id).await;
    state.connections.remove_connection(connection_id).await;

    send_task.abort();

    tracing::info!("WebSocket connection {} closed", connection_id);
}
