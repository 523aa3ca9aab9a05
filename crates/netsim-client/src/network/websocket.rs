use futures_util::{SinkExt, StreamExt};
use netsim_protocol::limits::MAX_MESSAGE_BYTES;
use netsim_protocol::{ClientMessage, ServerMessage};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{Message, protocol::WebSocketConfig},
};

use crate::error::Result;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub struct WebSocketClient {
    sender: mpsc::Sender<ClientMessage>,
}

impl WebSocketClient {
    /// Open the event channel. Server events arrive on the returned receiver,
    /// which closes when the socket does.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ServerMessage>)> {
        // Relayed media frames can exceed tungstenite's default frame size
        let config = WebSocketConfig::default()
            .max_message_size(Some(MAX_MESSAGE_BYTES))
            .max_frame_size(Some(MAX_MESSAGE_BYTES));
        let (ws_stream, _) = connect_async_with_config(url, Some(config), false).await?;
        tracing::info!("WebSocket connected to {}", url);

        let (mut write, mut read) = ws_stream.split();

        // Create channels for both directions
        let (tx, mut rx) = mpsc::channel::<ClientMessage>(100);
        let (incoming_tx, incoming_rx) = mpsc::channel::<ServerMessage>(100);

        // Spawn task to handle outgoing messages
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!("Failed to serialize {}: {}", msg.event_name(), e);
                        continue;
                    }
                };

                if write.send(Message::Text(json.into())).await.is_err() {
                    tracing::error!("Failed to send WebSocket message");
                    break;
                }
            }

            let _ = write.send(Message::Close(None)).await;
        });

        // Spawn task to handle incoming messages
        tokio::spawn(async move {
            while let Some(result) = read.next().await {
                match result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => {
                            if incoming_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("Ignoring unrecognised event: {}", e),
                    },
                    Ok(Message::Close(_)) => {
                        tracing::info!("WebSocket closed by server");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    // Pong is handled automatically by tungstenite
                    _ => {}
                }
            }
        });

        // Start ping task
        let tx_ping = tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx_ping.send(ClientMessage::Ping).await.is_err() {
                    break;
                }
            }
        });

        Ok((Self { sender: tx }, incoming_rx))
    }

    pub fn sender(&self) -> mpsc::Sender<ClientMessage> {
        self.sender.clone()
    }
}
